//! Application state assembly and REST server startup

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use bentley::daemon_logs::DaemonLogs;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::{RosterConfig, VectorBackend};
use crate::server::models::conversation::{ConversationStore, FileConversationStore};
use crate::server::models::profile::{FileProfileStore, ProfileStore};
use crate::server::routing::create_router;
use crate::server::services::embeddings::{EmbeddingClient, HttpEmbeddingClient};
use crate::server::services::explanations::{ExplanationService, OpenAiExplanationService};
use crate::server::services::memory_vectors::MemoryVectorDatabase;
use crate::server::services::profile_index::ProfileIndexManager;
use crate::server::services::result_sink::{ResultSink, SinkWorker};
use crate::server::services::search::{SearchOrchestrator, SearchTimeouts};
use crate::server::services::vector_database::VectorDatabase;

const COMPONENT: &str = "roster-server";

/// External collaborators the service is built from
pub struct Collaborators {
  pub profiles: Arc<dyn ProfileStore>,
  pub conversations: Arc<dyn ConversationStore>,
  pub embedder: Arc<dyn EmbeddingClient>,
  pub vectors: Arc<dyn VectorDatabase>,
  pub explainer: Arc<dyn ExplanationService>,
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<RosterConfig>,
  pub logger: Arc<DaemonLogs>,
  pub profiles: Arc<dyn ProfileStore>,
  pub conversations: Arc<dyn ConversationStore>,
  pub index: Arc<ProfileIndexManager>,
  pub search: Arc<SearchOrchestrator>,
}

impl AppState {
  /// Wire components together; the returned worker drains transcript writes
  pub fn assemble(config: RosterConfig, logger: DaemonLogs, parts: Collaborators) -> (Self, SinkWorker) {
    let (sink, worker) = ResultSink::spawn(parts.conversations.clone(), config.transcript.queue_capacity);

    let index = Arc::new(ProfileIndexManager::new(
      parts.embedder,
      parts.vectors,
      parts.profiles.clone(),
      config.reindex.page_size,
    ));

    let timeouts = SearchTimeouts {
      embedding: config.embedder_timeout(),
      search: config.search_timeout(),
      explanation: config.explanation_timeout(),
    };
    let search = Arc::new(SearchOrchestrator::new(
      index.clone(),
      parts.profiles.clone(),
      parts.conversations.clone(),
      parts.explainer,
      sink,
      timeouts,
    ));

    let state = Self {
      config: Arc::new(config),
      logger: Arc::new(logger),
      profiles: parts.profiles,
      conversations: parts.conversations,
      index,
      search,
    };
    (state, worker)
  }
}

/// Build the production collaborators described by `config`
pub async fn collaborators_from_config(config: &RosterConfig) -> Result<Collaborators> {
  let data_dir = &config.storage.data_dir;
  let profiles: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::new(data_dir)?);
  let conversations: Arc<dyn ConversationStore> = Arc::new(FileConversationStore::new(data_dir)?);

  let embedder: Arc<dyn EmbeddingClient> = Arc::new(
    HttpEmbeddingClient::new(&config.embedder.url, config.embedder.dimension, config.embedder_timeout())
      .context("Failed to build embedding client")?,
  );

  let explainer: Arc<dyn ExplanationService> = Arc::new(OpenAiExplanationService::new(
    &config.llm.base_url,
    config.llm.api_key.clone(),
    &config.llm.model,
    config.explanation_timeout(),
  )?);
  if config.llm.api_key.is_none() {
    bentley::warn!("No language model API key configured; results will carry the fallback explanation");
  }

  let vectors = vector_database_from_config(config).await?;

  Ok(Collaborators { profiles, conversations, embedder, vectors, explainer })
}

#[cfg(feature = "lancedb")]
async fn vector_database_from_config(config: &RosterConfig) -> Result<Arc<dyn VectorDatabase>> {
  use crate::server::services::lancedb::LanceDbVectorDatabase;

  Ok(match config.vector.backend {
    VectorBackend::Lancedb => Arc::new(LanceDbVectorDatabase::new(&config.vectors_dir(), &config.vector.table)),
    VectorBackend::Memory => Arc::new(MemoryVectorDatabase::new()),
  })
}

#[cfg(not(feature = "lancedb"))]
async fn vector_database_from_config(config: &RosterConfig) -> Result<Arc<dyn VectorDatabase>> {
  if config.vector.backend == VectorBackend::Lancedb {
    bentley::warn!("Built without LanceDB support; using the in-memory vector backend");
  }
  Ok(Arc::new(MemoryVectorDatabase::new()))
}

/// Start the REST server and run until Ctrl-C
pub async fn start_server(config: RosterConfig) -> Result<()> {
  let addr = config.server.bind;
  let daemon_logs = DaemonLogs::new(config.logs_path())?;
  daemon_logs.info(&format!("Starting roster REST server on {addr}"), COMPONENT).await;

  let parts = collaborators_from_config(&config).await?;
  let (state, sink_worker) = AppState::assemble(config, daemon_logs, parts);
  let logger = state.logger.clone();

  // A failed bootstrap must not stop CRUD traffic; search reports unavailable until it succeeds
  let bootstrap = tokio::spawn(state.index.clone().bootstrap_with_retry());

  let trace = TraceLayer::new_for_http()
    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
    .on_response(DefaultOnResponse::new().level(Level::INFO));
  let app = create_router(state).layer(ServiceBuilder::new().layer(trace).layer(CorsLayer::permissive()));

  let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
  logger.info(&format!("Server listening on {addr}"), COMPONENT).await;

  let served = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;
  bootstrap.abort();

  let stats = sink_worker.join().await;
  logger
    .info(
      &format!(
        "Transcript writes: {} submitted, {} persisted, {} failed, {} dropped",
        stats.submitted, stats.persisted, stats.failed, stats.dropped
      ),
      COMPONENT,
    )
    .await;

  match served {
    Ok(()) => {
      logger.info("Server shutdown gracefully", COMPONENT).await;
      Ok(())
    }
    Err(e) => {
      logger.error(&format!("Server error: {e}"), COMPONENT).await;
      Err(anyhow::anyhow!("Server error: {e}"))
    }
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    bentley::error!("Failed to listen for shutdown signal: {e}");
    std::future::pending::<()>().await;
  }
  bentley::info!("Shutdown requested");
}
