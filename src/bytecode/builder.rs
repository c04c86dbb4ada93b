/*!
  The `Builder` is the encoder/linker. It is a classic two pass assembler back end: instructions
  and label declarations are appended in a single forward pass, during which a control transfer
  may name a label that has not been declared yet. `Builder::finalize` is the second pass. It
  resolves every such forward reference and produces a `Program`, whose instructions are all
  fully encoded.
*/

use std::fmt::Write as FmtWrite;
use std::io::{self, Write};

use string_cache::DefaultAtom;
use thiserror::Error;

use super::{decode_instructions, encode_instructions, DecodeError, Instruction, Mode, Operation};
use crate::address::{Register, RelativeAddress, MAX_DISPLACEMENT, MIN_DISPLACEMENT};
use crate::symboltable::SymbolTable;

/// The highest code address a control transfer can reach.
pub const MAX_CODE_ADDRESS: usize = i16::MAX as usize;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
  #[error("label `{label}` is already declared at {address:04x}")]
  DuplicateLabel {
    label   : String,
    address : usize
  },
  #[error("instruction at {address:04x} refers to undeclared label `{label}`")]
  UndefinedLabel {
    label   : String,
    address : usize
  },
  #[error(
    "displacement {displacement} is outside the range {}..={}",
    MIN_DISPLACEMENT, MAX_DISPLACEMENT
  )]
  DisplacementOutOfRange {
    displacement : i64
  },
  #[error("{operation} does not take a {mode} operand")]
  IllegalMode {
    operation : Operation,
    mode      : Mode
  },
  #[error("label `{label}` at {address:04x} is beyond the reach of a 16 bit address")]
  AddressOutOfRange {
    label   : String,
    address : usize
  },
}

/// An appended instruction is either complete or waiting on a label.
#[derive(Clone, Debug)]
enum Slot {
  Resolved(Instruction),
  Pending {
    address   : usize,
    operation : Operation,
    /// Index into `Builder::unresolved`
    reference : usize
  }
}

#[derive(Clone, Debug)]
struct PendingReference {
  /// Index of the referring instruction
  index : usize,
  label : DefaultAtom
}

#[derive(Clone, Debug, Default)]
pub struct Builder {
  slots      : Vec<Slot>,
  labels     : SymbolTable,
  unresolved : Vec<PendingReference>,
  /// Byte offset of the next instruction
  offset     : usize,
}

impl Builder {

  pub fn new() -> Builder {
    Builder {
      slots      : vec![],
      labels     : SymbolTable::new(),
      unresolved : vec![],
      offset     : 0,
    }
  }

  /// The byte offset at which the next instruction will be placed.
  pub fn offset(&self) -> usize {
    self.offset
  }

  /// The number of instructions appended so far.
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn label_address(&self, label: &str) -> Option<usize> {
    self.labels.get_address(&DefaultAtom::from(label))
  }

  // region Appending instructions

  pub fn append_basic(&mut self, operation: Operation) -> Result<(), LinkError> {
    check_mode(operation, Mode::Basic)?;
    let instruction = Instruction::basic(self.offset, operation);
    self.append(Slot::Resolved(instruction), instruction.size());
    Ok(())
  }

  pub fn append_immediate(&mut self, operation: Operation, value: i32) -> Result<(), LinkError> {
    check_mode(operation, Mode::Immediate)?;
    let instruction = Instruction::immediate(self.offset, operation, value);
    self.append(Slot::Resolved(instruction), instruction.size());
    Ok(())
  }

  /// Appends an instruction whose operand is `displacement` bytes from `register`. Control
  /// transfers take a label instead.
  pub fn append_indirect(&mut self, operation: Operation, register: Register, displacement: i16)
    -> Result<(), LinkError>
  {
    if operation.takes_label() {
      return Err(LinkError::IllegalMode{ operation, mode: Mode::Indirect });
    }
    check_mode(operation, Mode::Indirect)?;
    let relative =
      RelativeAddress::new(register, displacement)
        .ok_or(LinkError::DisplacementOutOfRange{ displacement: displacement as i64 })?;
    let instruction = Instruction::relative(self.offset, operation, relative);
    self.append(Slot::Resolved(instruction), instruction.size());
    Ok(())
  }

  /// Appends a control transfer to `label`, which need not be declared yet.
  pub fn append_with_label(&mut self, operation: Operation, label: &str) -> Result<(), LinkError> {
    if !operation.takes_label() {
      return Err(LinkError::IllegalMode{ operation, mode: Mode::Indirect });
    }
    let reference = self.unresolved.len();
    self.unresolved.push(
      PendingReference {
        index : self.slots.len(),
        label : DefaultAtom::from(label)
      }
    );
    let slot = Slot::Pending {
      address: self.offset,
      operation,
      reference
    };
    self.append(slot, 1 + Mode::Indirect.operand_size());
    Ok(())
  }

  fn append(&mut self, slot: Slot, size: usize) {
    self.slots.push(slot);
    self.offset += size;
  }

  // endregion

  /// Binds `label` to the current offset. A label may be declared once.
  pub fn declare_label(&mut self, label: &str) -> Result<(), LinkError> {
    self.labels
        .insert(DefaultAtom::from(label), self.offset)
        .map_err(|address| LinkError::DuplicateLabel{ label: label.to_string(), address })
  }

  /**
    Resolves every label reference and returns the finished program. The builder itself is
    left untouched, so finalizing twice gives identical programs.
  */
  pub fn finalize(&self) -> Result<Program, LinkError> {
    let targets = self.unresolved
                      .iter()
                      .map(|reference| self.resolve(reference))
                      .collect::<Result<Vec<u16>, LinkError>>()?;

    let instructions =
      self.slots
          .iter()
          .map(|slot| match slot {

            Slot::Resolved(instruction) => *instruction,

            Slot::Pending{ address, operation, reference } => {
              Instruction::absolute(*address, *operation, targets[*reference])
            }

          })
          .collect();

    Ok(Program {
      instructions,
      labels: self.labels.clone()
    })
  }

  fn resolve(&self, reference: &PendingReference) -> Result<u16, LinkError> {
    let address =
      self.labels
          .get_address(&reference.label)
          .ok_or_else(|| LinkError::UndefinedLabel {
            label   : reference.label.to_string(),
            address : self.slot_address(reference.index)
          })?;

    match address <= MAX_CODE_ADDRESS {
      true  => Ok(address as u16),
      false => Err(LinkError::AddressOutOfRange{ label: reference.label.to_string(), address })
    }
  }

  fn slot_address(&self, index: usize) -> usize {
    match &self.slots[index] {
      Slot::Resolved(instruction) => instruction.address,
      Slot::Pending{ address, .. } => *address
    }
  }
}

fn check_mode(operation: Operation, mode: Mode) -> Result<(), LinkError> {
  match operation.accepts(mode) {
    true  => Ok(()),
    false => Err(LinkError::IllegalMode{ operation, mode })
  }
}

/// A fully linked program. Only its serialized bytes are needed to run it.
#[derive(Clone, Debug, Default)]
pub struct Program {
  instructions : Vec<Instruction>,
  labels       : SymbolTable,
}

impl Program {

  /// Reconstructs a program from a serialized byte stream. Labels are not recoverable.
  pub fn decode(code: &[u8]) -> Result<Program, DecodeError> {
    Ok(Program {
      instructions : decode_instructions(code)?,
      labels       : SymbolTable::new()
    })
  }

  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  /// The number of instructions.
  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  /// Size of the serialized program in bytes.
  pub fn size(&self) -> usize {
    self.instructions.iter().map(Instruction::size).sum()
  }

  pub fn serialize(&self) -> Vec<u8> {
    encode_instructions(&self.instructions)
  }

  /// One `"%04x <hex bytes>"` line per instruction.
  pub fn dump(&self) -> String {
    let mut text = String::new();
    for instruction in &self.instructions {
      // Writing to a `String` cannot fail.
      let _ = writeln!(text, "{}", instruction.dump());
    }
    text
  }

  pub fn dump_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
    writer.write_all(self.dump().as_bytes())
  }

  /// A human readable listing: the dump annotated with labels and assembly text.
  pub fn listing(&self) -> String {
    let mut text = String::new();
    for instruction in &self.instructions {
      let mut labels: Vec<String> =
        self.labels
            .get_labels(instruction.address)
            .iter()
            .map(|label| label.to_string())
            .collect();
      labels.sort();
      for label in labels {
        let _ = writeln!(text, "{}:", label);
      }
      let _ = writeln!(text, "  {:<24}{}", instruction.dump(), instruction);
    }
    text
  }
}

impl PartialEq for Program {
  // Labels are a debugging aid and do not take part in equality.
  fn eq(&self, other: &Program) -> bool {
    self.instructions == other.instructions
  }
}

impl Eq for Program {}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Operand;

  #[test]
  fn serializes_basic_and_immediate(){
    let mut builder = Builder::new();
    builder.append_basic(Operation::Add).unwrap();
    builder.append_immediate(Operation::Push, 0x7fffffff).unwrap();
    builder.append_immediate(Operation::Push, 0x11111111).unwrap();
    builder.append_basic(Operation::Sub).unwrap();
    builder.append_basic(Operation::Mul).unwrap();

    let program = builder.finalize().unwrap();
    assert_eq!(
      program.serialize(),
      vec![0x0a, 0x41, 0xff, 0xff, 0xff, 0x7f, 0x41, 0x11, 0x11, 0x11, 0x11, 0x0b, 0x0c]
    );
    assert_eq!(program.size(), 13);
  }

  #[test]
  fn offsets_advance_by_size(){
    let mut builder = Builder::new();
    builder.append_basic(Operation::Nop).unwrap();
    assert_eq!(builder.offset(), 1);
    builder.append_immediate(Operation::Push, 3).unwrap();
    assert_eq!(builder.offset(), 6);
    builder.append_indirect(Operation::Pop, Register::Sp, -4).unwrap();
    assert_eq!(builder.offset(), 9);
    builder.append_with_label(Operation::Jump, "anywhere").unwrap();
    assert_eq!(builder.offset(), 12);
    assert_eq!(builder.len(), 4);
  }

  #[test]
  fn labeled_instructions(){
    let mut builder = Builder::new();
    builder.declare_label("start").unwrap();
    builder.append_with_label(Operation::Jump, "end").unwrap();
    builder.append_basic(Operation::Nop).unwrap();
    builder.append_with_label(Operation::Jz, "start").unwrap();
    builder.declare_label("end").unwrap();
    builder.append_basic(Operation::Halt).unwrap();

    let program = builder.finalize().unwrap();
    assert_eq!(
      program.dump(),
      "0000 85 07 00\n\
       0003 00\n\
       0004 86 00 00\n\
       0007 07\n"
    );
  }

  #[test]
  fn forward_and_backward_references_agree(){
    let mut forward = Builder::new();
    forward.append_with_label(Operation::Call, "target").unwrap();
    forward.append_basic(Operation::Halt).unwrap();
    forward.declare_label("target").unwrap();
    forward.append_basic(Operation::Ret).unwrap();

    let mut backward = Builder::new();
    backward.append_basic(Operation::Nop).unwrap();
    backward.append_basic(Operation::Nop).unwrap();
    backward.append_basic(Operation::Nop).unwrap();
    backward.append_basic(Operation::Halt).unwrap();
    backward.declare_label("target").unwrap();
    backward.append_basic(Operation::Ret).unwrap();
    backward.append_with_label(Operation::Call, "target").unwrap();

    let forward = forward.finalize().unwrap();
    let backward = backward.finalize().unwrap();
    assert_eq!(forward.instructions()[0].operand, Operand::Absolute(4));
    assert_eq!(backward.instructions()[5].operand, Operand::Absolute(4));
  }

  #[test]
  fn duplicate_label_is_rejected(){
    let mut builder = Builder::new();
    builder.declare_label("here").unwrap();
    builder.append_basic(Operation::Nop).unwrap();
    assert_eq!(
      builder.declare_label("here"),
      Err(LinkError::DuplicateLabel{ label: "here".to_string(), address: 0 })
    );
    assert_eq!(builder.label_address("here"), Some(0));
  }

  #[test]
  fn undefined_label_fails_finalize(){
    let mut builder = Builder::new();
    builder.append_basic(Operation::Nop).unwrap();
    builder.append_with_label(Operation::Call, "nowhere").unwrap();
    assert_eq!(
      builder.finalize(),
      Err(LinkError::UndefinedLabel{ label: "nowhere".to_string(), address: 1 })
    );
  }

  #[test]
  fn displacement_out_of_range(){
    let mut builder = Builder::new();
    assert_eq!(
      builder.append_indirect(Operation::Push, Register::Fp, 0x2000),
      Err(LinkError::DisplacementOutOfRange{ displacement: 0x2000 })
    );
    assert!(builder.is_empty());
    assert_eq!(builder.offset(), 0);
  }

  #[test]
  fn finalize_is_repeatable(){
    let mut builder = Builder::new();
    builder.append_with_label(Operation::Jump, "again").unwrap();
    builder.declare_label("again").unwrap();
    builder.append_basic(Operation::Halt).unwrap();

    let first = builder.finalize().unwrap();
    let second = builder.finalize().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.serialize(), second.serialize());
  }

  #[test]
  fn decode_reproduces_program(){
    let mut builder = Builder::new();
    builder.append_with_label(Operation::Call, "main").unwrap();
    builder.append_basic(Operation::Halt).unwrap();
    builder.declare_label("main").unwrap();
    builder.append_immediate(Operation::Push, -1234).unwrap();
    builder.append_indirect(Operation::Pop, Register::Fp, 1).unwrap();
    builder.append_indirect(Operation::Push, Register::Ip, -3).unwrap();
    builder.append_basic(Operation::Print).unwrap();
    builder.append_basic(Operation::Ret).unwrap();

    let program = builder.finalize().unwrap();
    assert_eq!(Program::decode(&program.serialize()).unwrap(), program);
  }

  #[test]
  fn listing_names_labels(){
    let mut builder = Builder::new();
    builder.append_with_label(Operation::Call, "main").unwrap();
    builder.append_basic(Operation::Halt).unwrap();
    builder.declare_label("main").unwrap();
    builder.append_basic(Operation::Ret).unwrap();

    let listing = builder.finalize().unwrap().listing();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[2], "main:");
    assert!(lines[0].ends_with("CALL @0004"));
    assert!(lines[3].trim_start().starts_with("0004 04"));
  }

  #[test]
  fn illegal_modes_are_rejected(){
    let mut builder = Builder::new();
    builder.append_basic(Operation::Nop).unwrap();

    assert_eq!(
      builder.append_immediate(Operation::Pop, 7),
      Err(LinkError::IllegalMode{ operation: Operation::Pop, mode: Mode::Immediate })
    );
    assert_eq!(
      builder.append_basic(Operation::Push),
      Err(LinkError::IllegalMode{ operation: Operation::Push, mode: Mode::Basic })
    );
    assert_eq!(
      builder.append_with_label(Operation::Push, "somewhere"),
      Err(LinkError::IllegalMode{ operation: Operation::Push, mode: Mode::Indirect })
    );
    assert_eq!(
      builder.append_indirect(Operation::Jump, Register::Ip, 4),
      Err(LinkError::IllegalMode{ operation: Operation::Jump, mode: Mode::Indirect })
    );
    assert_eq!(
      builder.append_immediate(Operation::Add, 1),
      Err(LinkError::IllegalMode{ operation: Operation::Add, mode: Mode::Immediate })
    );

    assert_eq!(builder.offset(), 1);
    assert_eq!(builder.len(), 1);
    let program = builder.finalize().unwrap();
    assert_eq!(Program::decode(&program.serialize()).unwrap(), program);
  }
}
