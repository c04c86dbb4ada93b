use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser as ClapParser;

use svm::assembler::assemble_file;
use svm::log::{SHOW_INFO, SHOW_TIMESTAMP};
use svm::machine::Machine;
use svm::{error, info};

/// Assembles a program and runs it on the stack virtual machine.
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Assembly source file. Without one only the version banner is printed.
  source: Option<PathBuf>,

  /// Print the assembled program listing instead of running it
  #[arg(short, long)]
  dump: bool,

  /// Log informational messages
  #[arg(short, long)]
  verbose: bool,

  /// Omit timestamps from log messages
  #[arg(long)]
  no_timestamp: bool,
}

fn main() -> ExitCode {
  let args = Args::parse();

  SHOW_INFO.store(args.verbose, Ordering::Relaxed);
  SHOW_TIMESTAMP.store(!args.no_timestamp, Ordering::Relaxed);

  #[cfg(feature = "trace_computation")]
  eprintln!("Computation Tracing ENABLED");

  let source = match args.source {
    Some(source) => source,
    None         => {
      println!("Stack virtual machine, v. {}", env!("CARGO_PKG_VERSION"));
      return ExitCode::SUCCESS;
    }
  };

  if !source.is_file() {
    error!("file not found: {}", source.display());
    return ExitCode::FAILURE;
  }

  let program = match assemble_file(&source) {
    Ok(program) => program,
    Err(e)      => {
      error!("{}", e);
      return ExitCode::FAILURE;
    }
  };

  if args.dump {
    print!("{}", program.listing());
    return ExitCode::SUCCESS;
  }

  let mut machine = Machine::new();
  let outcome = machine.load(&program.serialize()).and_then(|_| machine.run());
  match outcome {
    Ok(()) => {
      info!("halted at {:04x}", machine.ip());
      ExitCode::SUCCESS
    }
    Err(fault) => {
      error!("{}", fault);
      ExitCode::FAILURE
    }
  }
}
