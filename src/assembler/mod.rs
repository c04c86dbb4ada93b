/*!
  The assembler turns assembly source into a linked `Program`. Source is scanned and parsed in a
  single pass that drives a `Builder`; the builder's finalize pass then resolves the labels.

  Errors carry the source line they were detected on and render as `error [<line>]: <message>`.
*/

mod parser;
mod scanner;
mod token;

pub use parser::Parser;
pub use scanner::Scanner;
pub use token::{Lexeme, Token};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bytecode::{LinkError, Program};

#[derive(Error, Debug)]
pub enum AssemblyError {
  #[error("error [{line}]: {message}")]
  Syntax {
    line    : usize,
    message : String
  },
  #[error("error [{line}]: {source}")]
  Link {
    line   : usize,
    source : LinkError
  },
  /// A label reference that is still unresolved once the whole source has been read.
  #[error("error: {0}")]
  Unresolved(#[from] LinkError),
  #[error("cannot read {}: {source}", path.display())]
  Io {
    path   : PathBuf,
    source : io::Error
  },
}

impl AssemblyError {
  /// The source line the error was detected on, if it belongs to one.
  pub fn line(&self) -> Option<usize> {
    match self {
      AssemblyError::Syntax{ line, .. } | AssemblyError::Link{ line, .. } => Some(*line),
      _ => None
    }
  }
}

/// Assembles and links `source`.
pub fn assemble(source: &str) -> Result<Program, AssemblyError> {
  let builder = Parser::new(source).parse()?;
  Ok(builder.finalize()?)
}

pub fn assemble_file(path: &Path) -> Result<Program, AssemblyError> {
  let source =
    fs::read_to_string(path)
      .map_err(|source| AssemblyError::Io{ path: path.to_path_buf(), source })?;
  let program = assemble(&source)?;
  if program.is_empty() {
    // Running an empty image walks NOPs off the end of memory.
    crate::warn!("{} contains no instructions", path.display());
  }
  crate::info!("assembled {} into {} bytes", path.display(), program.size());
  Ok(program)
}


#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = "


	; example 0
	  CALL main
	  HALT

	main:
	  PUSH 0 ; local
	  PUSH 345
	  POP [FP + 1]
	  PUSH [FP + 1]
	  PRINT
      RET

	";

  #[test]
  fn assembles_example(){
    let program = assemble(EXAMPLE).unwrap();
    let expected = "0000 83 04 00\n\
                    0003 07\n\
                    0004 41 00 00 00 00\n\
                    0009 41 59 01 00 00\n\
                    000e 82 01 80\n\
                    0011 81 01 80\n\
                    0014 09\n\
                    0015 04\n";
    assert_eq!(program.dump(), expected);
  }

  #[test]
  fn listing_shows_labels(){
    let listing = assemble(EXAMPLE).unwrap().listing();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 9);
    assert_eq!(lines[2], "main:");
    assert!(lines[0].ends_with("CALL @0004"));
    assert!(lines[5].ends_with("POP [FP+1]"));
  }

  #[test]
  fn reports_line_of_syntax_error(){
    let error = assemble("; syntax error\n\t\t777\n\t\tHALT\n\t").unwrap_err();
    assert_eq!(error.line(), Some(2));
    assert!(error.to_string().contains("NUM<777>"));
    assert_eq!(error.to_string(), "error [2]: line starts with NUM<777>");
  }

  #[test]
  fn undefined_label_fails_to_link(){
    let error = assemble("JUMP nowhere\n").unwrap_err();
    assert!(matches!(
      error,
      AssemblyError::Unresolved(LinkError::UndefinedLabel{ ref label, address: 0 }) if label == "nowhere"
    ));
    assert_eq!(error.line(), None);
  }

  #[test]
  fn label_placement_does_not_matter(){
    let forward  = assemble("JUMP end\nNOP\nend: HALT\n").unwrap();
    let backward = assemble("JUMP end\nNOP\nend:\nHALT\n").unwrap();
    assert_eq!(forward, backward);
    assert_eq!(forward.serialize(), vec![0x85, 0x04, 0x00, 0x00, 0x07]);
  }

  #[test]
  fn empty_file_assembles_to_nothing(){
    let path = std::env::temp_dir().join(format!("svm-empty-{}.asm", std::process::id()));
    fs::write(&path, "; nothing but a comment\n").unwrap();
    let program = assemble_file(&path);
    fs::remove_file(&path).unwrap();
    assert!(program.unwrap().is_empty());
  }

  #[test]
  fn missing_file(){
    let error = assemble_file(Path::new("/nonexistent/program.asm")).unwrap_err();
    assert!(matches!(error, AssemblyError::Io{ .. }));
  }
}
