/*!
  This module is responsible for the encoding and decoding of binary instruction streams.

  A stream has no header, footer or padding, so decoding walks it front to back: the opcode
  at each position gives the size of the instruction, and hence the position of the next one.
*/

use thiserror::Error;

use super::{decode_opcode, Instruction, Mode, Operand};
use crate::address::RelativeAddress;

#[derive(Error, Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
  #[error("illegal opcode {opcode:#04x} at {address:04x}")]
  IllegalOpcode {
    opcode  : u8,
    address : usize
  },
  #[error("instruction at {address:04x} is cut short by the end of the stream")]
  Truncated {
    address : usize
  },
}

/// Concatenates the encodings of `instructions` in order.
pub fn encode_instructions(instructions: &[Instruction]) -> Vec<u8> {
  instructions.iter()
              .flat_map(|instruction| instruction.encode())
              .collect()
}

/// Returns the size in bytes of an instruction beginning with `opcode`, or `None` if the opcode
/// is illegal.
pub fn instruction_size(opcode: u8) -> Option<usize> {
  decode_opcode(opcode).map(|(mode, _)| 1 + mode.operand_size())
}

/// Decodes the single instruction starting at `address` in `code`.
pub fn try_decode_instruction(code: &[u8], address: usize) -> Result<Instruction, DecodeError> {
  let opcode = *code.get(address).ok_or(DecodeError::Truncated{ address })?;
  let (mode, operation) =
    decode_opcode(opcode).ok_or(DecodeError::IllegalOpcode{ opcode, address })?;

  let start = address + 1;
  let operand_bytes = code.get(start..start + mode.operand_size())
                          .ok_or(DecodeError::Truncated{ address })?;

  let operand =
    match mode {

      Mode::Basic => Operand::None,

      Mode::Immediate => {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(operand_bytes);
        Operand::Immediate(i32::from_le_bytes(bytes))
      }

      Mode::Indirect => {
        let word = u16::from_le_bytes([operand_bytes[0], operand_bytes[1]]);
        match operation.takes_label() {
          true  => Operand::Absolute(word),
          false => Operand::Relative(RelativeAddress::decode(word))
        }
      }

    };

  Ok(Instruction{ address, operation, operand })
}

/// Decodes an entire stream. The stream must end exactly at an instruction boundary.
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
  let mut instructions = Vec::new();
  let mut address = 0;
  while address < code.len() {
    let instruction = try_decode_instruction(code, address)?;
    address += instruction.size();
    instructions.push(instruction);
  }
  Ok(instructions)
}
