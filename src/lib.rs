/*!
  A stack virtual machine and an assembler for it.

  Assembly source is turned into a linked `Program` by `assembler::assemble`. The program's
  serialized bytes are loaded into a `machine::Machine`, which interprets them until `HALT` or a
  fault.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod log;
pub mod address;
pub mod symboltable;
pub mod bytecode;
pub mod machine;
pub mod assembler;
