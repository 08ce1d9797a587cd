//! Persistent request logs
//!
//! Entries are appended to a JSONL file, one object per line, and can be read
//! back newest-last. Writes go through an internal lock so a single
//! [`DaemonLogs`] handle can be cloned into every request task.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[cfg(feature = "schemars")]
use schemars::JsonSchema;

use crate::Level;

/// Request metadata attached to a log entry
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct LogContext {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub request_id: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_agent: Option<String>,

  /// Caller identity, when the request carried one
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
}

/// One line of the log file
#[derive(Debug, Serialize, Deserialize, Clone)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub level: String,
  pub message: String,
  pub component: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<LogContext>,
}

struct Inner {
  path: PathBuf,
  silent: bool,
}

/// Cloneable handle to a JSONL log file
#[derive(Clone)]
pub struct DaemonLogs {
  inner: Arc<Mutex<Inner>>,
}

impl Inner {
  fn append(&self, entry: &LogEntry) -> io::Result<()> {
    let line =
      serde_json::to_string(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{line}")?;
    file.flush()
  }

  fn read(&self, limit: Option<usize>, level: Option<&str>) -> io::Result<Vec<LogEntry>> {
    if !self.path.exists() {
      return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&self.path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      // Torn or foreign lines are skipped
      let Ok(entry) = serde_json::from_str::<LogEntry>(&line) else {
        continue;
      };
      if level.is_none_or(|wanted| wanted == "all" || entry.level == wanted) {
        entries.push(entry);
      }
    }

    if let Some(limit) = limit {
      let skip = entries.len().saturating_sub(limit);
      entries.drain(..skip);
    }
    Ok(entries)
  }
}

impl DaemonLogs {
  /// Open (or create) the log file at `path`, echoing entries to stderr
  pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
    Self::new_with_silent(path, false)
  }

  /// Open (or create) the log file; `silent` suppresses the stderr echo
  pub fn new_with_silent<P: AsRef<Path>>(path: P, silent: bool) -> io::Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    if !path.exists() {
      File::create(&path)?;
    }
    Ok(Self { inner: Arc::new(Mutex::new(Inner { path, silent })) })
  }

  /// Append an entry, returning any I/O failure
  pub async fn add_log_with_context(
    &self,
    level: Level,
    message: &str,
    component: &str,
    context: Option<LogContext>,
  ) -> io::Result<()> {
    let entry = LogEntry {
      timestamp: Utc::now(),
      level: level.as_str().to_string(),
      message: message.to_string(),
      component: component.to_string(),
      context,
    };

    let guard = self.inner.lock().await;
    guard.append(&entry)?;
    if !guard.silent {
      crate::log(level, message);
    }
    Ok(())
  }

  /// Append an entry, ignoring write failures
  pub async fn record(
    &self,
    level: Level,
    message: &str,
    component: &str,
    context: Option<LogContext>,
  ) {
    if let Err(e) = self.add_log_with_context(level, message, component, context).await {
      crate::error!("failed to persist log entry: {e}");
    }
  }

  /// Read entries oldest-first, keeping the newest `limit`
  pub async fn get_logs(
    &self,
    limit: Option<usize>,
    level: Option<&str>,
  ) -> io::Result<Vec<LogEntry>> {
    let guard = self.inner.lock().await;
    guard.read(limit, level)
  }

  pub async fn path(&self) -> PathBuf {
    self.inner.lock().await.path.clone()
  }

  pub async fn info(&self, message: &str, component: &str) {
    self.record(Level::Info, message, component, None).await;
  }

  pub async fn warn(&self, message: &str, component: &str) {
    self.record(Level::Warn, message, component, None).await;
  }

  pub async fn error(&self, message: &str, component: &str) {
    self.record(Level::Error, message, component, None).await;
  }

  pub async fn success(&self, message: &str, component: &str) {
    self.record(Level::Success, message, component, None).await;
  }
}
