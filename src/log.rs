//! Leveled logging to stderr.
//!
//! Use the exported `info!`, `warn!` and `error!` macros. Messages are colored by level when
//! stderr is a terminal. Info messages are only shown once `SHOW_INFO` is set, which the command
//! line driver does for `--verbose`. Nothing is logged from unit tests.

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
  Info  = 1,
  Warn  = 2,
  Error = 3,
}

impl Display for Level {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Level::Info  => "INFO",
      Level::Warn  => "WARN",
      Level::Error => "ERROR",
    };
    // Width comes from the caller's format string.
    f.pad(name)
  }
}

pub static SHOW_TIMESTAMP : AtomicBool = AtomicBool::new(true);
pub static SHOW_INFO      : AtomicBool = AtomicBool::new(false);

/// Formats one log line. `since_epoch` is `None` when timestamps are disabled.
fn render(level: Level, message: &str, since_epoch: Option<Duration>) -> String {
  match since_epoch {

    Some(elapsed) => {
      let seconds = elapsed.as_secs();
      format!(
        "{:02}:{:02}:{:02}.{:03} [{:5}] {}",
        (seconds / 3600) % 24,
        (seconds / 60) % 60,
        seconds % 60,
        elapsed.subsec_millis(),
        level,
        message
      )
    }

    None => format!("[{:5}] {}", level, message)

  }
}

/// Internal logging function. Use the `info!`, `warn!`, or `error!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
  if level == Level::Info && !SHOW_INFO.load(Ordering::Relaxed) {
    return;
  }

  let since_epoch =
    match SHOW_TIMESTAMP.load(Ordering::Relaxed) {
      true  => Some(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()),
      false => None
    };

  let mut stderr = StandardStream::stderr(ColorChoice::Auto);
  let mut spec = ColorSpec::new();
  match level {
    Level::Warn  => { spec.set_fg(Some(Color::Yellow)).set_bold(true); }
    Level::Error => { spec.set_fg(Some(Color::Red)).set_bold(true); }
    Level::Info  => {}
  }
  // A failure to log has nowhere to be reported.
  let _ = stderr.set_color(&spec);
  let _ = writeln!(stderr, "{}", render(level, message, since_epoch));
  let _ = stderr.reset();
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => {{
    if cfg!(not(test)) {
      $crate::log::log($crate::log::Level::Info, &format!($($arg)*));
    }
  }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
  ($($arg:tt)*) => {{
    if cfg!(not(test)) {
      $crate::log::log($crate::log::Level::Warn, &format!($($arg)*));
    }
  }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => {{
    if cfg!(not(test)) {
      $crate::log::log($crate::log::Level::Error, &format!($($arg)*));
    }
  }};
}
