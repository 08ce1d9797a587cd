//! Layered service configuration
//!
//! Built-in defaults are overlaid by an optional YAML file, which is in turn
//! overlaid by command-line flags and environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RosterConfig {
  pub server: ServerConfig,
  pub storage: StorageConfig,
  pub embedder: EmbedderConfig,
  pub vector: VectorConfig,
  pub llm: LlmConfig,
  pub reindex: ReindexConfig,
  pub transcript: TranscriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
  /// Root for profile records, transcripts, vectors and request logs
  pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
  pub url: String,
  pub dimension: usize,
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
  Lancedb,
  Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
  pub backend: VectorBackend,
  pub table: String,
  pub search_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
  pub base_url: String,
  pub api_key: Option<String>,
  pub model: String,
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReindexConfig {
  pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptConfig {
  pub queue_capacity: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { bind: SocketAddr::from(([127, 0, 0, 1], 3000)) }
  }
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self { data_dir: default_data_dir() }
  }
}

impl Default for EmbedderConfig {
  fn default() -> Self {
    Self { url: "http://127.0.0.1:8001".to_string(), dimension: 384, timeout_secs: 10 }
  }
}

impl Default for VectorConfig {
  fn default() -> Self {
    Self { backend: VectorBackend::Lancedb, table: "profiles".to_string(), search_timeout_secs: 10 }
  }
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.openai.com/v1".to_string(),
      api_key: None,
      model: "gpt-4o-mini".to_string(),
      timeout_secs: 180,
    }
  }
}

impl Default for ReindexConfig {
  fn default() -> Self {
    Self { page_size: 100 }
  }
}

impl Default for TranscriptConfig {
  fn default() -> Self {
    Self { queue_capacity: 1024 }
  }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub bind: Option<SocketAddr>,
  pub data_dir: Option<PathBuf>,
  pub embedder_url: Option<String>,
  pub vector_backend: Option<VectorBackend>,
  pub llm_api_key: Option<String>,
  pub llm_model: Option<String>,
}

impl RosterConfig {
  /// Defaults, overlaid by the YAML file at `path` when one is given
  pub fn load(path: Option<&Path>) -> Result<Self> {
    match path {
      Some(path) => Self::from_file(path),
      None => Ok(Self::default()),
    }
  }

  pub fn from_file(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
  }

  pub fn from_yaml(raw: &str) -> Result<Self> {
    if raw.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(raw)?)
  }

  pub fn with_overrides(mut self, overrides: Overrides) -> Self {
    if let Some(bind) = overrides.bind {
      self.server.bind = bind;
    }
    if let Some(dir) = overrides.data_dir {
      self.storage.data_dir = dir;
    }
    if let Some(url) = overrides.embedder_url {
      self.embedder.url = url;
    }
    if let Some(backend) = overrides.vector_backend {
      self.vector.backend = backend;
    }
    if let Some(key) = overrides.llm_api_key {
      self.llm.api_key = Some(key);
    }
    if let Some(model) = overrides.llm_model {
      self.llm.model = model;
    }
    self
  }

  pub fn embedder_timeout(&self) -> Duration {
    Duration::from_secs(self.embedder.timeout_secs)
  }

  pub fn search_timeout(&self) -> Duration {
    Duration::from_secs(self.vector.search_timeout_secs)
  }

  pub fn explanation_timeout(&self) -> Duration {
    Duration::from_secs(self.llm.timeout_secs)
  }

  pub fn logs_path(&self) -> PathBuf {
    self.storage.data_dir.join("logs").join("rest_server.logs.jsonl")
  }

  pub fn vectors_dir(&self) -> PathBuf {
    self.storage.data_dir.join("vectors")
  }
}

fn default_data_dir() -> PathBuf {
  dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".roster")
}
