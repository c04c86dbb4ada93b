use std::collections::HashMap;

use string_cache::DefaultAtom;

/**
  A symbol table maps label names to the byte offset in code memory at which they were
  declared. Names are interned. A name may be bound only once; several names may share an
  offset, as happens when two labels precede the same instruction.
*/
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
  table: HashMap<DefaultAtom, usize>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table: HashMap::new()
    }
  }

  pub fn get_address(&self, label: &DefaultAtom) -> Option<usize> {
    self.table.get(label).copied()
  }

  /// Binds `label` to `address` unless it is already bound, in which case the existing
  /// address is returned as the error and the table is unchanged.
  pub fn insert(&mut self, label: DefaultAtom, address: usize) -> Result<(), usize> {
    match self.table.get(&label) {
      Some(existing) => Err(*existing),
      None           => {
        self.table.insert(label, address);
        Ok(())
      }
    }
  }

  /// Labels bound to `address`, in no particular order.
  pub fn get_labels(&self, address: usize) -> Vec<DefaultAtom> {
    self.table
        .iter()
        .filter(|(_, bound)| **bound == address)
        .map(|(label, _)| label.clone())
        .collect()
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}
