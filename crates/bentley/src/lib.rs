//! Bentley - levelled console logging for the roster services
//!
//! Every line goes to stderr behind a short coloured level tag, so service
//! output stays greppable when several components share one terminal.
//!
//! ## Usage
//!
//! ```
//! let profile = "p-42";
//! bentley::info!("indexed profile {profile}");
//! bentley::warn!("embedding took {}ms", 1200);
//! ```
//!
//! With the `daemon-logs` feature, [`daemon_logs::DaemonLogs`] additionally
//! persists entries (with optional request context) to a JSONL file.

use colored::*;

#[cfg(feature = "daemon-logs")]
pub mod daemon_logs;

/// Severity of a console log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
  Verbose,
  Info,
  Warn,
  Error,
  Success,
}

impl Level {
  /// Tag written inside the brackets
  pub fn tag(self) -> &'static str {
    match self {
      Level::Verbose => "verb",
      Level::Info => "info",
      Level::Warn => "warn",
      Level::Error => "error",
      Level::Success => "sccs",
    }
  }

  /// Name used when the level is persisted
  pub fn as_str(self) -> &'static str {
    match self {
      Level::Verbose => "verbose",
      Level::Info => "info",
      Level::Warn => "warn",
      Level::Error => "error",
      Level::Success => "success",
    }
  }

  fn color(self) -> Color {
    match self {
      Level::Verbose => Color::Cyan,
      Level::Info => Color::Blue,
      Level::Warn => Color::Yellow,
      Level::Error => Color::Red,
      Level::Success => Color::Green,
    }
  }
}

/// Build the padded `[tag]` prefix for a level
pub fn prefix(level: Level) -> String {
  let tag = level.tag();
  let padding = 7usize.saturating_sub(tag.len() + 2);
  format!("[{}]{:<padding$}", tag.color(level.color()).bold(), "")
}

/// Render every line of `message` with the level prefix
pub fn render(level: Level, message: &str) -> Vec<String> {
  let prefix = prefix(level);
  message.lines().map(|line| format!("{prefix} {line}")).collect()
}

/// Write a message at the given level to stderr
pub fn log(level: Level, message: &str) {
  for line in render(level, message) {
    eprintln!("{line}");
  }
}

pub fn verbose(message: &str) {
  log(Level::Verbose, message);
}

/// General information
pub fn info(message: &str) {
  log(Level::Info, message);
}

/// Something needs attention but the operation continued
pub fn warn(message: &str) {
  log(Level::Warn, message);
}

/// Something failed
pub fn error(message: &str) {
  log(Level::Error, message);
}

/// Something completed successfully
pub fn success(message: &str) {
  log(Level::Success, message);
}

/// Format-args logging macros; these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! verbose {
  ($($arg:tt)*) => {
    $crate::verbose(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => {
    $crate::info(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($($arg:tt)*) => {
    $crate::warn(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => {
    $crate::error(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => {
    $crate::success(&format!($($arg)*)) // LCOV_EXCL_LINE
  };
}
