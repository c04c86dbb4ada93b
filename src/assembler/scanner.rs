/*!
  The scanner splits assembly source into lexemes on demand. Spaces, tabs, carriage returns and
  comments running from `;` to the end of the line are skipped between tokens. Newlines are
  tokens, since they terminate lines in the grammar.

  Words are classified after they are recognized: a word that is an operation mnemonic or a
  register name becomes that keyword, anything else is an identifier.
*/

use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{is_a, take_while},
  character::complete::{anychar, char as one_char, digit1, satisfy},
  combinator::{eof, map, recognize, value},
  multi::many0_count,
  sequence::{pair, preceded},
  IResult
};
use string_cache::DefaultAtom;

use super::token::{Lexeme, Token};
use crate::address::Register;
use crate::bytecode::Operation;

/// Whitespace and comments.
fn trivia(input: &str) -> IResult<&str, usize> {
  many0_count(
    alt((
      is_a(" \t\r"),
      preceded(one_char(';'), take_while(|c: char| c != '\n'))
    ))
  )(input)
}

fn word(input: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      satisfy(|c| c.is_alphabetic() || c == '_'),
      take_while(|c: char| c.is_alphanumeric() || c == '_')
    )
  )(input)
}

fn classify(text: &str) -> Token {
  if let Ok(operation) = Operation::from_str(text) {
    return Token::Operation(operation);
  }
  match Register::from_str(text) {
    Ok(register) => Token::Register(register),
    Err(_)       => Token::Ident(DefaultAtom::from(text))
  }
}

fn token(input: &str) -> IResult<&str, Token> {
  preceded(
    trivia,
    alt((
      value(Token::Eos, eof),
      map(word, classify),
      map(digit1, |digits: &str| Token::Number(digits.to_string())),
      value(Token::NewLine,      one_char('\n')),
      value(Token::Colon,        one_char(':')),
      value(Token::LeftBracket,  one_char('[')),
      value(Token::RightBracket, one_char(']')),
      value(Token::Plus,         one_char('+')),
      value(Token::Minus,        one_char('-')),
      map(anychar, Token::Unknown)
    ))
  )(input)
}

pub struct Scanner<'a> {
  rest : &'a str,
  /// The line of the next unread character, counting from 1.
  line : usize,
}

impl<'a> Scanner<'a> {

  pub fn new(source: &'a str) -> Scanner<'a> {
    Scanner {
      rest : source,
      line : 1
    }
  }

  /// Reads the next lexeme. Once the source is exhausted every call returns `Token::Eos`.
  pub fn scan_one(&mut self) -> Lexeme {
    let line = self.line;
    let token =
      match token(self.rest) {
        Ok((rest, token)) => {
          self.rest = rest;
          token
        }
        // Every character matches some alternative, so only an empty input can get here.
        Err(_) => Token::Eos
      };

    if token == Token::NewLine {
      self.line += 1;
    }
    Lexeme{ token, line }
  }

}
