//! The machine's only window on the outside world: `INPUT` reads a signed integer and `PRINT`
//! writes one. Integers on the input side are separated by any whitespace, so several may share
//! a line.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use super::Fault;

pub struct Console<R, W> {
  input   : R,
  output  : W,
  /// Words read from the current input line but not consumed yet.
  pending : VecDeque<String>,
}

impl<R: BufRead, W: Write> Console<R, W> {

  pub fn new(input: R, output: W) -> Self {
    Console {
      input,
      output,
      pending: VecDeque::new()
    }
  }

  /// Blocks until a whole integer is available.
  pub fn read_integer(&mut self) -> Result<i32, Fault> {
    loop {
      if let Some(word) = self.pending.pop_front() {
        return word.parse::<i32>()
                   .map_err(|_| Fault::Input(format!("`{}` is not a 32 bit integer", word)));
      }

      let mut line = String::new();
      let count = self.input
                      .read_line(&mut line)
                      .map_err(|e| Fault::Input(e.to_string()))?;
      if count == 0 {
        return Err(Fault::Input("unexpected end of input".to_string()));
      }
      self.pending.extend(line.split_whitespace().map(str::to_string));
    }
  }

  pub fn print_integer(&mut self, value: i32) -> Result<(), Fault> {
    writeln!(self.output, "{}", value)?;
    // Flush so that a prompt is visible before the next `INPUT` blocks.
    self.output.flush()?;
    Ok(())
  }
}
