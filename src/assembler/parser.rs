/*!
  A recursive descent parser over the scanner's lexemes with a single lexeme of lookahead. It
  feeds the `Builder` as it goes, so the only thing it returns is the builder, ready to be
  finalized.

    Program      := {NEWLINE} Line*
    Line         := [Label] [Operation] NEWLINE
    Label        := IDENT ':'
    Operation    := 'PUSH' (SignedNumber | Indirect)
                  | 'POP' Indirect
                  | ('CALL' | 'JUMP' | 'JZ') IDENT
                  | NullaryOp
    Indirect     := '[' REGISTER ('+' | '-') NUMBER ']'
    SignedNumber := ['+' | '-'] NUMBER

  The last line may end at the end of the source instead of a newline.
*/

use std::mem;

use super::scanner::Scanner;
use super::token::{Lexeme, Token};
use super::AssemblyError;
use crate::address::Register;
use crate::bytecode::{Builder, LinkError, Operation};

pub struct Parser<'a> {
  scanner   : Scanner<'a>,
  lookahead : Lexeme,
  builder   : Builder,
}

impl<'a> Parser<'a> {

  pub fn new(source: &'a str) -> Parser<'a> {
    let mut scanner = Scanner::new(source);
    let lookahead   = scanner.scan_one();
    Parser {
      scanner,
      lookahead,
      builder: Builder::new()
    }
  }

  /// Parses the whole source. Labels are not checked for resolution here.
  pub fn parse(mut self) -> Result<Builder, AssemblyError> {
    self.skip_new_lines();
    while !self.has(&Token::Eos) {
      self.parse_line()?;
    }
    Ok(self.builder)
  }

  fn parse_line(&mut self) -> Result<(), AssemblyError> {
    let mut parsed = false;

    if let Token::Ident(_) = self.lookahead.token {
      self.parse_label()?;
      parsed = true;
    }

    if let Token::Operation(_) = self.lookahead.token {
      self.parse_operation()?;
      parsed = true;
    }

    match self.lookahead.token {

      Token::NewLine => {
        self.skip_new_lines();
        Ok(())
      }

      Token::Eos => Ok(()),

      _ if !parsed => Err(self.report(format!("line starts with {}", self.lookahead.token))),

      _ => Err(self.report(format!("expected end of line but found {}", self.lookahead.token)))

    }
  }

  fn parse_label(&mut self) -> Result<(), AssemblyError> {
    let Lexeme{ token, line } = self.advance();
    if let Token::Ident(name) = token {
      if !self.has(&Token::Colon) {
        return Err(self.report(format!("label `{}` must be followed by `:`", name)));
      }
      self.advance();
      self.builder
          .declare_label(&name)
          .map_err(|source| AssemblyError::Link{ line, source })?;
    }
    Ok(())
  }

  fn parse_operation(&mut self) -> Result<(), AssemblyError> {
    let Lexeme{ token, line } = self.advance();
    let operation = match token {
      Token::Operation(operation) => operation,
      other                       => {
        return Err(self.report(format!("expected an operation but found {}", other)));
      }
    };

    match operation {

      Operation::Push => {
        match self.lookahead.token {

          Token::Number(_) | Token::Plus | Token::Minus => {
            let value  = self.parse_number()?;
            let result = self.builder.append_immediate(Operation::Push, value);
            link(result, line)?;
          }

          Token::LeftBracket => {
            let (register, displacement) = self.parse_indirect()?;
            let result = self.builder.append_indirect(Operation::Push, register, displacement);
            link(result, line)?;
          }

          _ => {
            return Err(self.report(format!(
              "PUSH expects a number or an indirect address but found {}", self.lookahead.token
            )));
          }

        }
      }

      Operation::Pop => {
        if !self.has(&Token::LeftBracket) {
          return Err(self.report(format!(
            "POP expects an indirect address but found {}", self.lookahead.token
          )));
        }
        let (register, displacement) = self.parse_indirect()?;
        let result = self.builder.append_indirect(Operation::Pop, register, displacement);
        link(result, line)?;
      }

      operation if operation.takes_label() => {
        let lexeme = self.advance();
        match lexeme.token {
          Token::Ident(label) => link(self.builder.append_with_label(operation, &label), line)?,
          other               => {
            return Err(self.report_at(
              lexeme.line,
              format!("{} expects a label but found {}", operation, other)
            ));
          }
        }
      }

      operation => link(self.builder.append_basic(operation), line)?

    }
    Ok(())
  }

  /// SignedNumber := ['+' | '-'] NUMBER
  fn parse_number(&mut self) -> Result<i32, AssemblyError> {
    let negative = self.parse_sign(true)?;
    let magnitude = self.parse_magnitude()?;
    let value = match negative {
      true  => -magnitude,
      false => magnitude
    };
    i32::try_from(value)
        .map_err(|_| self.report(format!("number {} does not fit in 32 bits", value)))
  }

  /// Indirect := '[' REGISTER ('+' | '-') NUMBER ']'
  fn parse_indirect(&mut self) -> Result<(Register, i16), AssemblyError> {
    self.expect(Token::LeftBracket)?;

    let lexeme = self.advance();
    let register = match lexeme.token {
      Token::Register(register) => register,
      other                     => {
        return Err(self.report_at(lexeme.line, format!("expected a register but found {}", other)));
      }
    };

    let negative  = self.parse_sign(false)?;
    let magnitude = self.parse_magnitude()?;
    let value = match negative {
      true  => -magnitude,
      false => magnitude
    };
    let displacement =
      i16::try_from(value)
          .map_err(|_| AssemblyError::Link {
            line   : self.lookahead.line,
            source : LinkError::DisplacementOutOfRange{
              displacement: value
            }
          })?;

    self.expect(Token::RightBracket)?;
    Ok((register, displacement))
  }

  /// Consumes a `+` or `-`, returning whether it was a minus. The sign is mandatory unless
  /// `optional` is set.
  fn parse_sign(&mut self, optional: bool) -> Result<bool, AssemblyError> {
    match self.lookahead.token {
      Token::Plus  => {
        self.advance();
        Ok(false)
      }
      Token::Minus => {
        self.advance();
        Ok(true)
      }
      _ if optional => Ok(false),
      _ => Err(self.report(format!("expected `+` or `-` but found {}", self.lookahead.token)))
    }
  }

  /// Reads the digits of a number. Anything that does not fit in 32 bits is rejected here, with
  /// room left over for negating.
  fn parse_magnitude(&mut self) -> Result<i64, AssemblyError> {
    let lexeme = self.advance();
    match lexeme.token {
      Token::Number(digits) => {
        digits.parse::<i64>()
              .ok()
              .filter(|magnitude| *magnitude <= 1 << 31)
              .ok_or_else(|| self.report_at(
                lexeme.line, format!("number {} does not fit in 32 bits", digits)
              ))
      }
      other => Err(self.report_at(lexeme.line, format!("expected a number but found {}", other)))
    }
  }

  // region Lookahead helpers

  fn has(&self, token: &Token) -> bool {
    self.lookahead.token == *token
  }

  /// Replaces the lookahead with the next lexeme and returns the old lookahead.
  fn advance(&mut self) -> Lexeme {
    let next = self.scanner.scan_one();
    mem::replace(&mut self.lookahead, next)
  }

  fn expect(&mut self, expected: Token) -> Result<Lexeme, AssemblyError> {
    match self.has(&expected) {
      true  => Ok(self.advance()),
      false => Err(self.report(format!("expected {} but found {}", expected, self.lookahead.token)))
    }
  }

  fn skip_new_lines(&mut self) {
    while self.has(&Token::NewLine) {
      self.advance();
    }
  }

  /// An error at the line of the lookahead.
  fn report(&self, message: String) -> AssemblyError {
    self.report_at(self.lookahead.line, message)
  }

  fn report_at(&self, line: usize, message: String) -> AssemblyError {
    AssemblyError::Syntax{ line, message }
  }

  // endregion
}

/// Attaches the source line to an error raised by the builder.
fn link(result: Result<(), LinkError>, line: usize) -> Result<(), AssemblyError> {
  result.map_err(|source| AssemblyError::Link{ line, source })
}


#[cfg(test)]
mod tests {
  use super::*;

  fn parse(source: &str) -> Result<Builder, AssemblyError> {
    Parser::new(source).parse()
  }

  fn syntax_error(source: &str) -> (usize, String) {
    match parse(source) {
      Err(AssemblyError::Syntax{ line, message }) => (line, message),
      Err(other) => panic!("expected a syntax error, got {}", other),
      Ok(_)      => panic!("expected a syntax error for {:?}", source),
    }
  }

  #[test]
  fn empty_sources(){
    for source in ["", "\n\n", "  ; nothing here\n", "\t\r\n"].iter() {
      assert!(parse(source).unwrap().is_empty());
    }
  }

  #[test]
  fn last_line_may_end_at_eos(){
    let builder = parse("PUSH 1\nPRINT\nHALT").unwrap();
    assert_eq!(builder.len(), 3);
    assert_eq!(builder.offset(), 7);
  }

  #[test]
  fn labels_bind_to_the_next_instruction(){
    let builder = parse("start:\n  NOP\nend: HALT\nlast:").unwrap();
    assert_eq!(builder.label_address("start"), Some(0));
    assert_eq!(builder.label_address("end"), Some(1));
    assert_eq!(builder.label_address("last"), Some(2));
  }

  #[test]
  fn signed_numbers(){
    let program = parse("PUSH -2147483648\nPUSH +5\nPUSH 2147483647\n").unwrap().finalize().unwrap();
    assert_eq!(
      program.serialize(),
      vec![0x41, 0x00, 0x00, 0x00, 0x80, 0x41, 0x05, 0x00, 0x00, 0x00, 0x41, 0xff, 0xff, 0xff, 0x7f]
    );
  }

  #[test]
  fn numbers_out_of_range(){
    let (line, message) = syntax_error("NOP\nPUSH 2147483648\n");
    assert_eq!(line, 2);
    assert!(message.contains("2147483648"));
    syntax_error("PUSH 99999999999999999999999\n");
  }

  #[test]
  fn indirect_needs_a_sign(){
    let (_, message) = syntax_error("PUSH [FP 4]\n");
    assert_eq!(message, "expected `+` or `-` but found NUM<4>");
    let (_, message) = syntax_error("POP [4]\n");
    assert_eq!(message, "expected a register but found NUM<4>");
    let (_, message) = syntax_error("POP [SP+4\n");
    assert_eq!(message, "expected ] but found \\n");
  }

  #[test]
  fn displacement_out_of_range(){
    match parse("HALT\nPUSH [SP+8192]\n") {
      Err(AssemblyError::Link{ line: 2, source: LinkError::DisplacementOutOfRange{ displacement: 8192 } }) => {}
      other => panic!("unexpected result {:?}", other.map(|builder| builder.len())),
    }
    assert!(parse("PUSH [SP-8192]\n").is_ok());
  }

  #[test]
  fn oversized_displacement_keeps_its_value(){
    match parse("PUSH [SP+40000]\n") {
      Err(AssemblyError::Link{ line: 1, source: LinkError::DisplacementOutOfRange{ displacement: 40000 } }) => {}
      other => panic!("unexpected result {:?}", other.map(|builder| builder.len())),
    }
    let error = parse("POP [FP-70000]\n").unwrap_err();
    assert!(error.to_string().contains("-70000"));
  }

  #[test]
  fn operand_errors(){
    let (_, message) = syntax_error("POP 4\n");
    assert_eq!(message, "POP expects an indirect address but found NUM<4>");
    let (_, message) = syntax_error("PUSH\n");
    assert_eq!(message, "PUSH expects a number or an indirect address but found \\n");
    let (_, message) = syntax_error("POP");
    assert_eq!(message, "POP expects an indirect address but found Eos");
    let (_, message) = syntax_error("JUMP 12\n");
    assert_eq!(message, "JUMP expects a label but found NUM<12>");
    let (_, message) = syntax_error("main HALT\n");
    assert_eq!(message, "label `main` must be followed by `:`");
  }

  #[test]
  fn trailing_tokens(){
    let (line, message) = syntax_error("\n\nHALT HALT\n");
    assert_eq!(line, 3);
    assert_eq!(message, "expected end of line but found OP<HALT>");
    let (_, message) = syntax_error("$\n");
    assert_eq!(message, "line starts with Unknown");
  }

  #[test]
  fn duplicate_label_reports_line(){
    match parse("a:\nNOP\na:\nHALT\n") {
      Err(AssemblyError::Link{ line: 3, source: LinkError::DuplicateLabel{ address: 0, .. } }) => {}
      other => panic!("unexpected result {:?}", other.map(|builder| builder.len())),
    }
  }
}
