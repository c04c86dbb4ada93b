/*!

  The VM uses a 32 bit little-endian word size and 16 bit signed byte addresses. Instructions
  are variable length and are laid out back to back with no alignment padding. The first byte
  of every instruction is its opcode:

    [Mode:2][Operation:6]

  The mode alone determines the operand that follows the opcode, and therefore the size of the
  instruction:

    Basic      (0x00):  no operand                      1 byte
    Immediate  (0x40):  [Integer:32]                    5 bytes
    Indirect   (0x80):  [Register:2][Displacement:14]   3 bytes

  An indirect operand is a relative address (see `crate::address`) for `PUSH` and `POP`, and an
  absolute code address for the control transfer operations `CALL`, `JUMP` and `JZ`.

  As in the assembly source, labels do not appear in the bytecode. They are resolved to code
  addresses by the `Builder` before the program is serialized.

*/

mod binary;
mod builder;
mod instruction;

pub use binary::{encode_instructions, try_decode_instruction, decode_instructions, instruction_size,
                 DecodeError};
pub use builder::{Builder, Program, LinkError};
pub use instruction::{Instruction, Operand};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

/// The bits of an opcode holding the operation.
pub const OPERATION_MASK: u8 = 0x3F;
/// The bits of an opcode holding the addressing mode.
pub const MODE_MASK: u8 = 0xC0;

/**
  Operations of the virtual machine.

  The discriminant of each variant is its 6 bit operation code, so the order the operations
  are listed below is significant and is part of the binary format. The strum derives give
  each operation its assembly mnemonic, e.g. `Operation::Jz` <-> `"JZ"`.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq,  Debug,    Hash
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Operation {
  Nop,
  // Memory //
  Push,              // push( literal | address )
  Pop,               // pop( address )
  // Control //
  Call,              // call( label )
  Ret,               // ret
  Jump,              // jump( label )
  Jz,                // jz( label )
  Halt,              // halt
  // I/O //
  Input,             // input
  Print,             // print
  // Arithmetic //
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Neg,
  // Bitwise //
  And,
  Or,
  Not,
  // Comparison //
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

/// Addressing modes, stored in the top two bits of an opcode.
#[derive(
  StrumDisplay, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,  Eq, PartialEq,  Debug,  Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Mode {
  Basic     = 0,
  Immediate = 1,
  Indirect  = 2,
}

impl Mode {
  /// The mode's bits as they appear in an opcode.
  pub fn bits(&self) -> u8 {
    Into::<u8>::into(*self) << 6
  }

  /// Size in bytes of the operand following an opcode of this mode.
  pub fn operand_size(&self) -> usize {
    match self {
      Mode::Basic     => 0,
      Mode::Immediate => 4,
      Mode::Indirect  => 2,
    }
  }
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn opcode(&self, mode: Mode) -> u8 {
    mode.bits() | self.code()
  }

  /// Whether the operand of this operation is a code address, written as a label in assembly.
  pub fn takes_label(&self) -> bool {
    matches!(self, Operation::Call | Operation::Jump | Operation::Jz)
  }

  /// Whether `mode` is a legal addressing mode for this operation.
  pub fn accepts(&self, mode: Mode) -> bool {
    match self {
      Operation::Push => mode != Mode::Basic,
      Operation::Pop
      | Operation::Call
      | Operation::Jump
      | Operation::Jz => mode == Mode::Indirect,
      _               => mode == Mode::Basic
    }
  }
}

/// Splits an opcode into its mode and operation. Returns `None` if either part is unknown or
/// the operation does not accept the mode.
pub fn decode_opcode(opcode: u8) -> Option<(Mode, Operation)> {
  let mode      = Mode::try_from(opcode >> 6).ok()?;
  let operation = Operation::try_from(opcode & OPERATION_MASK).ok()?;
  match operation.accepts(mode) {
    true  => Some((mode, operation)),
    false => None
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;
  use strum::IntoEnumIterator;

  #[test]
  fn operation_codes(){
    assert_eq!(Operation::Nop.code(), 0);
    assert_eq!(Operation::Add.code(), 0x0a);
    assert_eq!(Operation::Ge.code(), 24);
    assert_eq!(Operation::iter().count(), 25);
  }

  #[test]
  fn mnemonics_are_injective(){
    for operation in Operation::iter() {
      let mnemonic: &'static str = operation.into();
      assert_eq!(Operation::from_str(mnemonic), Ok(operation));
    }
    assert_eq!(Operation::from_str("INPUT"), Ok(Operation::Input));
    assert!(Operation::from_str("push").is_err());
  }

  #[test]
  fn opcode_bits(){
    assert_eq!(Operation::Push.opcode(Mode::Immediate), 0x41);
    assert_eq!(Operation::Call.opcode(Mode::Indirect), 0x83);
    assert_eq!(Operation::Halt.opcode(Mode::Basic), 0x07);
  }

  #[test]
  fn decodes_legal_opcodes_only(){
    assert_eq!(decode_opcode(0x41), Some((Mode::Immediate, Operation::Push)));
    assert_eq!(decode_opcode(0x81), Some((Mode::Indirect, Operation::Push)));
    assert_eq!(decode_opcode(0x0c), Some((Mode::Basic, Operation::Mul)));
    // PUSH without an operand
    assert_eq!(decode_opcode(0x01), None);
    // ADD with an immediate operand
    assert_eq!(decode_opcode(0x4a), None);
    // Unknown operation and unknown mode
    assert_eq!(decode_opcode(0x19), None);
    assert_eq!(decode_opcode(0xC0), None);
  }
}
