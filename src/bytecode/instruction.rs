use std::fmt::{Display, Formatter};

use super::{Mode, Operation};
use crate::address::RelativeAddress;

/// The operand following an opcode. The variant determines the instruction's addressing mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operand {
  /// No operand
  None,
  /// [Integer:32]
  Immediate(i32),
  /// [Register:2][Displacement:14]
  Relative(RelativeAddress),
  /// [Address:16], the target of a control transfer
  Absolute(u16),
}

impl Operand {
  pub fn mode(&self) -> Mode {
    match self {
      Operand::None         => Mode::Basic,
      Operand::Immediate(_) => Mode::Immediate,
      | Operand::Relative(_)
      | Operand::Absolute(_) => Mode::Indirect,
    }
  }
}

/// A single decoded instruction together with the byte offset at which it sits in the program.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
  pub address   : usize,
  pub operation : Operation,
  pub operand   : Operand,
}

impl Instruction {

  pub fn basic(address: usize, operation: Operation) -> Instruction {
    Instruction{ address, operation, operand: Operand::None }
  }

  pub fn immediate(address: usize, operation: Operation, value: i32) -> Instruction {
    Instruction{ address, operation, operand: Operand::Immediate(value) }
  }

  pub fn relative(address: usize, operation: Operation, relative: RelativeAddress) -> Instruction {
    Instruction{ address, operation, operand: Operand::Relative(relative) }
  }

  pub fn absolute(address: usize, operation: Operation, target: u16) -> Instruction {
    Instruction{ address, operation, operand: Operand::Absolute(target) }
  }

  pub fn mode(&self) -> Mode {
    self.operand.mode()
  }

  pub fn opcode(&self) -> u8 {
    self.operation.opcode(self.mode())
  }

  /// Size in bytes, a function of the mode alone.
  pub fn size(&self) -> usize {
    1 + self.mode().operand_size()
  }

  /// The exact bytes of this instruction in the program image.
  pub fn encode(&self) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(self.size());
    bytes.push(self.opcode());
    match self.operand {

      Operand::None => {}

      Operand::Immediate(value) => {
        bytes.extend_from_slice(&value.to_le_bytes());
      }

      Operand::Relative(relative) => {
        bytes.extend_from_slice(&relative.encode().to_le_bytes());
      }

      Operand::Absolute(target) => {
        bytes.extend_from_slice(&target.to_le_bytes());
      }

    }
    bytes
  }

  /// Renders the instruction as `"%04x <hex bytes>"`, e.g. `0004 41 00 00 00 00`.
  pub fn dump(&self) -> String {
    let bytes = self.encode()
                    .iter()
                    .map(|byte| format!("{:02x}", byte))
                    .collect::<Vec<String>>()
                    .join(" ");
    format!("{:04x} {}", self.address, bytes)
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.operand {

      Operand::None => {
        write!(f, "{}", self.operation)
      }

      Operand::Immediate(value) => {
        write!(f, "{} {}", self.operation, value)
      }

      Operand::Relative(relative) => {
        write!(f, "{} {}", self.operation, relative)
      }

      Operand::Absolute(target) => {
        write!(f, "{} @{:04x}", self.operation, target)
      }

    }
  }
}
