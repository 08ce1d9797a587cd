//! Client for the external embedding service
//!
//! The service accepts a batch of texts and returns one vector per text:
//! `POST {base}/embed {"texts": [...]}` -> `{"embeddings": [[f32]]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  #[serde(default)]
  embeddings: Vec<Vec<f32>>,
  #[serde(default)]
  error: Option<String>,
}

/// Text-to-vector conversion, batched into one call per request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
  /// Fixed length of every returned vector
  fn dimension(&self) -> usize;

  /// One vector per input text, in input order
  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = self.embed_batch(&[text.to_string()]).await?;
    vectors.pop().ok_or(EmbeddingError::CountMismatch { expected: 1, actual: 0 })
  }
}

/// HTTP implementation backed by `reqwest`
pub struct HttpEmbeddingClient {
  http: reqwest::Client,
  endpoint: String,
  dimension: usize,
  timeout: Duration,
}

impl HttpEmbeddingClient {
  pub fn new(base_url: &str, dimension: usize, timeout: Duration) -> Result<Self, EmbeddingError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
    Ok(Self {
      http,
      endpoint: format!("{}/embed", base_url.trim_end_matches('/')),
      dimension,
      timeout,
    })
  }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
  fn dimension(&self) -> usize {
    self.dimension
  }

  async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let response = self
      .http
      .post(&self.endpoint)
      .json(&EmbeddingRequest { texts })
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          EmbeddingError::Timeout(self.timeout)
        } else {
          EmbeddingError::Transport(e.to_string())
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::Status { status: status.as_u16(), body });
    }

    let parsed: EmbeddingResponse =
      response.json().await.map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
    if let Some(error) = parsed.error {
      return Err(EmbeddingError::Malformed(error));
    }

    validate_embeddings(parsed.embeddings, texts.len(), self.dimension)
  }
}

/// Reject responses whose shape does not match the request
pub fn validate_embeddings(
  embeddings: Vec<Vec<f32>>,
  expected_count: usize,
  dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
  if embeddings.len() != expected_count {
    return Err(EmbeddingError::CountMismatch { expected: expected_count, actual: embeddings.len() });
  }
  if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
    return Err(EmbeddingError::DimensionMismatch { expected: dimension, actual: bad.len() });
  }
  Ok(embeddings)
}
