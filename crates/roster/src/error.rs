//! Error taxonomy for the search and indexing pipeline

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to the embedding service
#[derive(Debug, Error)]
pub enum EmbeddingError {
  #[error("embedding service request failed: {0}")]
  Transport(String),

  #[error("embedding service returned status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("embedding service returned a malformed response: {0}")]
  Malformed(String),

  #[error("expected {expected} embeddings, received {actual}")]
  CountMismatch { expected: usize, actual: usize },

  #[error("expected embeddings of dimension {expected}, received {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("embedding service timed out after {0:?}")]
  Timeout(Duration),
}

/// Failures of the vector similarity engine
#[derive(Debug, Error)]
pub enum VectorDbError {
  /// The engine could not serve the call; reported upstream as "search backend unavailable"
  #[error("vector engine unavailable: {0}")]
  Unavailable(String),

  #[error("collection expects vectors of dimension {expected}, received {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

impl VectorDbError {
  pub fn unavailable(err: impl fmt::Display) -> Self {
    Self::Unavailable(err.to_string())
  }
}

/// Failure to index a single profile
#[derive(Debug, Error)]
pub enum IndexError {
  #[error("failed to embed profile {profile_id}: {source}")]
  Embedding {
    profile_id: String,
    #[source]
    source: EmbeddingError,
  },

  #[error("failed to store vector for profile {profile_id}: {source}")]
  VectorDb {
    profile_id: String,
    #[source]
    source: VectorDbError,
  },

  #[error("failed to read profiles: {0}")]
  Store(String),
}

/// Orchestrator state of a search request, also reported with its failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStage {
  Parsing,
  Embedding,
  Searching,
  Hydrating,
  Enriching,
  Streaming,
  Closed,
}

impl fmt::Display for SearchStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SearchStage::Parsing => "parsing",
      SearchStage::Embedding => "embedding",
      SearchStage::Searching => "searching",
      SearchStage::Hydrating => "hydrating",
      SearchStage::Enriching => "enriching",
      SearchStage::Streaming => "streaming",
      SearchStage::Closed => "closed",
    };
    f.write_str(name)
  }
}

/// Request-level search failure; any of these aborts the request before streaming starts
#[derive(Debug, Error)]
pub enum SearchError {
  #[error("invalid search request: {0}")]
  InvalidRequest(String),

  #[error("conversation {0} not found")]
  ConversationNotFound(String),

  #[error("search backend unavailable while {stage}: {reason}")]
  BackendUnavailable { stage: SearchStage, reason: String },
}

impl SearchError {
  pub fn invalid(reason: impl Into<String>) -> Self {
    Self::InvalidRequest(reason.into())
  }

  pub fn backend(stage: SearchStage, reason: impl fmt::Display) -> Self {
    Self::BackendUnavailable { stage, reason: reason.to_string() }
  }

  /// Stable key used in API error bodies
  pub fn key(&self) -> &'static str {
    match self {
      SearchError::InvalidRequest(_) => "invalid_request",
      SearchError::ConversationNotFound(_) => "conversation_not_found",
      SearchError::BackendUnavailable { .. } => "search_backend_unavailable",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backend_errors_name_the_stage() {
    let err = SearchError::backend(SearchStage::Embedding, "connection refused");
    assert_eq!(
      err.to_string(),
      "search backend unavailable while embedding: connection refused"
    );
    assert_eq!(err.key(), "search_backend_unavailable");
  }

  #[test]
  fn index_errors_keep_their_source() {
    let err = IndexError::Embedding {
      profile_id: "p1".into(),
      source: EmbeddingError::Timeout(Duration::from_secs(10)),
    };
    let source = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("embedding service timed out after 10s"));
  }
}
