//! Roster REST Server
//!
//! Serves semantic people search, conversation transcripts, and the sync
//! endpoints the CRUD layer uses to keep the profile index current.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use roster::config::{Overrides, RosterConfig, VectorBackend};
use roster::server::startup::start_server;

#[derive(Parser)]
#[command(name = "roster_server")]
#[command(about = "Roster semantic search REST API server")]
#[command(version)]
struct Args {
  /// YAML configuration file
  #[arg(short, long, env = "ROSTER_CONFIG")]
  config: Option<PathBuf>,

  /// Server bind address
  #[arg(long, env = "ROSTER_BIND")]
  bind: Option<SocketAddr>,

  /// Directory for records, transcripts, vectors and logs
  #[arg(long, env = "ROSTER_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Base URL of the embedding service
  #[arg(long, env = "ROSTER_EMBEDDER_URL")]
  embedder_url: Option<String>,

  /// Vector backend: lancedb or memory
  #[arg(long, env = "ROSTER_VECTOR_BACKEND", value_parser = parse_backend)]
  vector_backend: Option<VectorBackend>,

  /// API key for the explanation model
  #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
  llm_api_key: Option<String>,

  /// Explanation model name
  #[arg(long, env = "ROSTER_LLM_MODEL")]
  llm_model: Option<String>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

fn parse_backend(raw: &str) -> Result<VectorBackend, String> {
  match raw.to_ascii_lowercase().as_str() {
    "lancedb" => Ok(VectorBackend::Lancedb),
    "memory" => Ok(VectorBackend::Memory),
    other => Err(format!("unknown vector backend '{other}' (expected lancedb or memory)")),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  // Keep Lance and DataFusion quiet unless asked
  let filter = if args.verbose {
    EnvFilter::new("info,lance=warn,lance_datafusion=warn,datafusion=warn")
  } else {
    EnvFilter::new("roster=info,tower_http=info,lance=error,lance_datafusion=error,datafusion=error,warn")
  };
  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  let config = RosterConfig::load(args.config.as_deref())?.with_overrides(Overrides {
    bind: args.bind,
    data_dir: args.data_dir,
    embedder_url: args.embedder_url,
    vector_backend: args.vector_backend,
    llm_api_key: args.llm_api_key,
    llm_model: args.llm_model,
  });

  bentley::info!("Starting Roster REST Server v{}", env!("CARGO_PKG_VERSION"));
  bentley::info!("Binding to address: {}", config.server.bind);

  start_server(config).await
}
