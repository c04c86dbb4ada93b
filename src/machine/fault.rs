use std::io;

use thiserror::Error;

/// Conditions that end a run. None of them can be recovered from within the run.
#[derive(Error, Debug)]
pub enum Fault {
  #[error("memory access at {address} is outside of machine memory")]
  OutOfBounds {
    address : i16
  },
  #[error("division by zero at {ip:04x}")]
  DivisionByZero {
    ip : i16
  },
  #[error("illegal opcode {opcode:#04x} at {ip:04x}")]
  IllegalOpcode {
    opcode : u8,
    ip     : i16
  },
  #[error("cannot read input: {0}")]
  Input(String),
  #[error("cannot write output: {0}")]
  Output(#[from] io::Error),
  #[error("a program of {size} bytes does not fit in machine memory")]
  ProgramTooLarge {
    size : usize
  },
}
