use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::address::Register;
use crate::bytecode::Operation;

/// The terminal symbols of assembly source.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
  Ident(DefaultAtom),
  Operation(Operation),
  Register(Register),
  /// Decimal digits, unconverted so that range errors can be reported by the parser.
  Number(String),
  NewLine,
  Colon,
  LeftBracket,
  RightBracket,
  Plus,
  Minus,
  Eos,
  Unknown(char),
}

impl Display for Token {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Token::Ident(name)           => write!(f, "IDENT<{}>", name),
      Token::Operation(operation)  => write!(f, "OP<{}>", operation),
      Token::Register(register)    => write!(f, "REG<{}>", register),
      Token::Number(digits)        => write!(f, "NUM<{}>", digits),
      Token::NewLine               => write!(f, "\\n"),
      Token::Colon                 => write!(f, ":"),
      Token::LeftBracket           => write!(f, "["),
      Token::RightBracket          => write!(f, "]"),
      Token::Plus                  => write!(f, "+"),
      Token::Minus                 => write!(f, "-"),
      Token::Eos                   => write!(f, "Eos"),
      Token::Unknown(_)            => write!(f, "Unknown"),
    }
  }
}

/// A token and the source line it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct Lexeme {
  pub token : Token,
  pub line  : usize,
}
