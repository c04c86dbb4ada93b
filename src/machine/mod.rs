//! Structures and functions for the stack machine that executes assembled bytecode.
//!
//! The machine has a single flat memory of `MEMORY_SIZE` bytes. A program is loaded at address
//! zero, and the evaluation stack grows upward from the first byte past the end of the program.
//! Call frames live on the same stack:
//!
//! ```text
//! ... | arguments | return ip | caller fp | locals ... | temporaries
//!                                        ^ fp         ^ sp moves here
//! ```

mod console;
mod fault;

pub use console::Console;
pub use fault::Fault;

use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Write};
use std::ops::Range;

use prettytable::{format as TableFormat, Table};

use crate::address::{Register, RelativeAddress};
use crate::bytecode::{decode_opcode, Mode, Operation};

pub const MEMORY_SIZE: usize = 1024 * 16;

/// Size in bytes of a stack value.
const VALUE_SIZE: i16 = 4;

/// The outcome of a single step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
  Running,
  Halted
}

pub struct Machine {
  // Memory Store //
  memory    : Box<[u8]>,   // Code followed by the stack
  code_size : usize,       // Bytes of loaded code

  // Registers //
  ip : i16,                // Instruction pointer
  sp : i16,                // Stack pointer
  fp : i16,                // Frame pointer
}

impl Machine {

  pub fn new() -> Machine {
    Machine {
      memory    : vec![0u8; MEMORY_SIZE].into_boxed_slice(),
      code_size : 0,
      ip        : 0,
      sp        : 0,
      fp        : 0,
    }
  }

  /// Copies `code` to address zero and places the stack just past its end.
  pub fn load(&mut self, code: &[u8]) -> Result<(), Fault> {
    if code.len() > MEMORY_SIZE {
      return Err(Fault::ProgramTooLarge{ size: code.len() });
    }
    self.memory.fill(0);
    self.memory[..code.len()].copy_from_slice(code);
    self.code_size = code.len();
    self.ip = 0;
    self.fp = 0;
    self.sp = code.len() as i16;
    Ok(())
  }

  pub fn ip(&self) -> i16 {
    self.ip
  }

  pub fn sp(&self) -> i16 {
    self.sp
  }

  pub fn fp(&self) -> i16 {
    self.fp
  }

  // region Running

  /// Runs until `HALT` with `INPUT` and `PRINT` bound to the process's stdin and stdout.
  pub fn run(&mut self) -> Result<(), Fault> {
    let stdin  = io::stdin();
    let stdout = io::stdout();
    self.run_with(stdin.lock(), stdout.lock())
  }

  /// Runs until `HALT` or a fault.
  pub fn run_with<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), Fault> {
    let mut console = Console::new(input, output);
    loop {
      let state = self.step(&mut console)?;

      #[cfg(feature = "trace_computation")] eprintln!("{}", self);

      if state == State::Halted {
        return Ok(());
      }
    }
  }

  /// Fetches, decodes and executes one instruction.
  pub fn step<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>)
    -> Result<State, Fault>
  {
    let ip     = self.ip;
    let opcode = self.fetch_byte()?;
    let (mode, operation) = decode_opcode(opcode).ok_or(Fault::IllegalOpcode{ opcode, ip })?;

    #[cfg(feature = "trace_computation")] eprintln!("{:04x}: {} ({})", ip, operation, mode);

    match operation {

      Operation::Nop => {}

      Operation::Push => {
        let value = match mode {
          Mode::Immediate => self.fetch_integer()?,
          _               => {
            let address = self.fetch_relative_address()?;
            self.read(address)?
          }
        };
        self.push(value)?;
      }

      Operation::Pop => {
        // The address is resolved before the value leaves the stack.
        let address = self.fetch_relative_address()?;
        let value   = self.pop()?;
        self.write(address, value)?;
      }

      Operation::Call => {
        let target    = self.fetch_target()?;
        let return_ip = self.ip;
        let caller_fp = self.fp;
        self.push(return_ip as i32)?;
        self.push(caller_fp as i32)?;
        self.fp = self.sp;
        self.ip = target;
      }

      Operation::Ret => {
        let value = self.pop()?;
        self.sp = self.fp;
        self.fp = self.pop()? as i16;
        self.ip = self.pop()? as i16;
        self.push(value)?;
      }

      Operation::Jump => {
        self.ip = self.fetch_target()?;
      }

      Operation::Jz => {
        let target = self.fetch_target()?;
        if self.pop()? == 0 {
          self.ip = target;
        }
      }

      Operation::Halt => return Ok(State::Halted),

      Operation::Input => {
        let value = console.read_integer()?;
        self.push(value)?;
      }

      Operation::Print => {
        let value = self.pop()?;
        console.print_integer(value)?;
      }

      Operation::Neg => self.unary(i32::wrapping_neg)?,
      Operation::Not => self.unary(|value| !value)?,

      Operation::Add => self.binary(i32::wrapping_add)?,
      Operation::Sub => self.binary(i32::wrapping_sub)?,
      Operation::Mul => self.binary(i32::wrapping_mul)?,
      Operation::Div => self.division(ip, i32::wrapping_div)?,
      Operation::Mod => self.division(ip, i32::wrapping_rem)?,
      Operation::And => self.binary(|left, right| left & right)?,
      Operation::Or  => self.binary(|left, right| left | right)?,

      Operation::Eq => self.comparison(|left, right| left == right)?,
      Operation::Ne => self.comparison(|left, right| left != right)?,
      Operation::Lt => self.comparison(|left, right| left <  right)?,
      Operation::Le => self.comparison(|left, right| left <= right)?,
      Operation::Gt => self.comparison(|left, right| left >  right)?,
      Operation::Ge => self.comparison(|left, right| left >= right)?,

    }

    Ok(State::Running)
  }

  fn unary(&mut self, op: fn(i32) -> i32) -> Result<(), Fault> {
    let value = self.pop()?;
    self.push(op(value))
  }

  /// Pops the right operand, then the left, and pushes `op(left, right)`.
  fn binary(&mut self, op: fn(i32, i32) -> i32) -> Result<(), Fault> {
    let right = self.pop()?;
    let left  = self.pop()?;
    self.push(op(left, right))
  }

  fn division(&mut self, ip: i16, op: fn(i32, i32) -> i32) -> Result<(), Fault> {
    let right = self.pop()?;
    let left  = self.pop()?;
    if right == 0 {
      return Err(Fault::DivisionByZero{ ip });
    }
    self.push(op(left, right))
  }

  fn comparison(&mut self, op: fn(i32, i32) -> bool) -> Result<(), Fault> {
    let right = self.pop()?;
    let left  = self.pop()?;
    self.push(op(left, right) as i32)
  }

  // endregion

  // region Operand fetching

  fn fetch_byte(&mut self) -> Result<u8, Fault> {
    let span = self.span(self.ip, 1)?;
    self.ip = self.ip.wrapping_add(1);
    Ok(self.memory[span.start])
  }

  fn fetch_word(&mut self) -> Result<u16, Fault> {
    let word = self.read_word(self.ip)?;
    self.ip = self.ip.wrapping_add(2);
    Ok(word)
  }

  fn fetch_integer(&mut self) -> Result<i32, Fault> {
    let value = self.read(self.ip)?;
    self.ip = self.ip.wrapping_add(VALUE_SIZE);
    Ok(value)
  }

  /// Reads an absolute code address. `JUMP`, `JZ` and `CALL` all consume their operand before
  /// transferring control.
  fn fetch_target(&mut self) -> Result<i16, Fault> {
    Ok(self.fetch_word()? as i16)
  }

  /// Reads a relative address operand and resolves it. For IP-relative addresses the register
  /// value is the address of the next instruction.
  fn fetch_relative_address(&mut self) -> Result<i16, Fault> {
    let word = self.fetch_word()?;
    Ok(self.resolve_relative_address(RelativeAddress::decode(word)))
  }

  /// The absolute byte address named by `relative`, using the current register values.
  pub fn resolve_relative_address(&self, relative: RelativeAddress) -> i16 {
    let base = match relative.register {
      Some(Register::Sp) => self.sp,
      Some(Register::Fp) => self.fp,
      Some(Register::Ip) => self.ip,
      None               => 0
    };
    base.wrapping_add(relative.displacement)
  }

  // endregion

  // region Memory and stack primitives

  /// The memory range `[address, address + length)`, if it lies entirely within memory.
  fn span(&self, address: i16, length: usize) -> Result<Range<usize>, Fault> {
    let start = usize::try_from(address).map_err(|_| Fault::OutOfBounds{ address })?;
    let end   = start + length;
    match end <= self.memory.len() {
      true  => Ok(start..end),
      false => Err(Fault::OutOfBounds{ address })
    }
  }

  fn read_word(&self, address: i16) -> Result<u16, Fault> {
    let span  = self.span(address, 2)?;
    let bytes = &self.memory[span];
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
  }

  pub fn read(&self, address: i16) -> Result<i32, Fault> {
    let span = self.span(address, VALUE_SIZE as usize)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&self.memory[span]);
    Ok(i32::from_le_bytes(bytes))
  }

  pub fn write(&mut self, address: i16, value: i32) -> Result<(), Fault> {
    let span = self.span(address, VALUE_SIZE as usize)?;
    self.memory[span].copy_from_slice(&value.to_le_bytes());
    Ok(())
  }

  pub fn push(&mut self, value: i32) -> Result<(), Fault> {
    self.write(self.sp, value)?;
    self.sp = self.sp.wrapping_add(VALUE_SIZE);
    Ok(())
  }

  pub fn pop(&mut self) -> Result<i32, Fault> {
    self.sp = self.sp.wrapping_sub(VALUE_SIZE);
    self.read(self.sp)
  }

  /// The value on top of the stack, if there is one above the loaded code.
  pub fn peek(&self) -> Option<i32> {
    let top = self.sp.wrapping_sub(VALUE_SIZE);
    match (top as isize) >= self.code_size as isize {
      true  => self.read(top).ok(),
      false => None
    }
  }

  // endregion

  // region Display methods

  /// Addresses and values of the stack from the end of code up to `sp`.
  fn stack_values(&self) -> Vec<(i16, i32)> {
    (self.code_size as i16..self.sp)
      .step_by(VALUE_SIZE as usize)
      .filter_map(|address| self.read(address).ok().map(|value| (address, value)))
      .collect()
  }

  fn make_stack_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (address, value) in self.stack_values().iter().rev() {
      match *address == self.fp {

        true  => {
          table.add_row(row![r->format!("FP --> {:04x} =", address), value]);
        }

        false => {
          table.add_row(row![r->format!("{:04x} =", address), value]);
        }

      } // end match on frame pointer
    } // end for
    table
  }

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Value"]);

    for (name, value) in [("IP", self.ip), ("SP", self.sp), ("FP", self.fp)].iter() {
      table.add_row(row![r->name, format!("{:04x}", value)]);
    }
    table
  }

  // endregion
}

impl Default for Machine {
  fn default() -> Machine {
    Machine::new()
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let stack_table    = self.make_stack_table();

    let mut combined_table = table!([register_table, stack_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "{}", combined_table)
  }
}
