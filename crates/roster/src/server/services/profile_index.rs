//! Keeps the vector index consistent with the primary profile store
//!
//! Single-profile indexing runs as a side effect of profile changes and never
//! fails the change itself. Drift is repaired by `reindex_organization`, which
//! is idempotent because every write is an upsert keyed by profile id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EmbeddingError, IndexError, VectorDbError};
use crate::server::models::profile::{Profile, ProfileEvent, ProfileStore};
use crate::server::models::search::ScoredCandidate;
use crate::server::services::embeddings::EmbeddingClient;
use crate::server::services::vector_database::{VectorDatabase, VectorFilter, VectorPayload, VectorRecord};

const BOOTSTRAP_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const BOOTSTRAP_MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct ProfileIndexManager {
  embedder: Arc<dyn EmbeddingClient>,
  vectors: Arc<dyn VectorDatabase>,
  profiles: Arc<dyn ProfileStore>,
  page_size: usize,
  ready: AtomicBool,
}

impl ProfileIndexManager {
  pub fn new(
    embedder: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorDatabase>,
    profiles: Arc<dyn ProfileStore>,
    page_size: usize,
  ) -> Self {
    Self { embedder, vectors, profiles, page_size: page_size.max(1), ready: AtomicBool::new(false) }
  }

  /// Whether the collection has been bootstrapped
  pub fn is_ready(&self) -> bool {
    self.ready.load(Ordering::Acquire)
  }

  /// Create the collection for the embedder's dimension; safe to repeat
  pub async fn bootstrap(&self) -> Result<(), VectorDbError> {
    self.vectors.ensure_collection(self.embedder.dimension()).await?;
    self.ready.store(true, Ordering::Release);
    Ok(())
  }

  /// Bootstrap until it succeeds, backing off between attempts.
  /// A dimension mismatch is a configuration error and is not retried.
  pub async fn bootstrap_with_retry(self: Arc<Self>) {
    let mut backoff = BOOTSTRAP_INITIAL_BACKOFF;
    loop {
      match self.bootstrap().await {
        Ok(()) => {
          bentley::success!("Vector collection ready");
          return;
        }
        Err(e @ VectorDbError::DimensionMismatch { .. }) => {
          bentley::error!("Vector collection cannot be used, search stays unavailable: {e}");
          return;
        }
        Err(e) => {
          bentley::warn!("Vector collection bootstrap failed, retrying in {backoff:?}: {e}");
          tokio::time::sleep(backoff).await;
          backoff = (backoff * 2).min(BOOTSTRAP_MAX_BACKOFF);
        }
      }
    }
  }

  /// Embed the profile's description and store its vector
  pub async fn index_profile(&self, profile: &Profile) -> Result<(), IndexError> {
    let vector = self
      .embedder
      .embed(profile.embedding_text())
      .await
      .map_err(|source| IndexError::Embedding { profile_id: profile.id.clone(), source })?;
    self.store_vector(profile, vector).await
  }

  pub async fn remove_profile(&self, profile_id: &str) -> Result<(), IndexError> {
    self
      .vectors
      .delete(profile_id)
      .await
      .map_err(|source| IndexError::VectorDb { profile_id: profile_id.to_string(), source })
  }

  /// Route a lifecycle change to the index; failures are logged, never returned
  pub async fn on_profile_event(&self, event: ProfileEvent, profile: &Profile) {
    let outcome = match event {
      ProfileEvent::Created | ProfileEvent::Updated | ProfileEvent::Restored => {
        self.index_profile(profile).await
      }
      ProfileEvent::SoftDeleted | ProfileEvent::Deleted => self.remove_profile(&profile.id).await,
    };

    if let Err(e) = outcome {
      bentley::warn!("Index update for profile {} after {event:?} failed: {e}", profile.id);
    }
  }

  /// Re-embed every profile of an organization, page by page.
  /// Returns how many profiles were embedded and stored; deleted profiles are
  /// removed from the index instead and are not counted.
  pub async fn reindex_organization(&self, organization_id: &str) -> Result<usize, IndexError> {
    let mut indexed = 0;
    let mut page = 0;

    loop {
      let batch = self
        .profiles
        .list_by_organization(organization_id, page, self.page_size)
        .await
        .map_err(|e| IndexError::Store(format!("{e:#}")))?;
      if batch.profiles.is_empty() {
        break;
      }

      indexed += self.reindex_page(&batch.profiles).await;
      bentley::verbose!(
        "Reindexed page {page} of organization {organization_id} ({indexed} indexed so far)"
      );

      page += 1;
      if page * self.page_size >= batch.total {
        break;
      }
    }

    bentley::info!("Reindexed {indexed} profiles for organization {organization_id}");
    Ok(indexed)
  }

  async fn reindex_page(&self, profiles: &[Profile]) -> usize {
    let (live, deleted): (Vec<&Profile>, Vec<&Profile>) = profiles.iter().partition(|p| p.is_live());

    for profile in deleted {
      if let Err(e) = self.remove_profile(&profile.id).await {
        bentley::warn!("Failed to remove deleted profile {} from index: {e}", profile.id);
      }
    }

    let texts: Vec<String> = live.iter().map(|p| p.embedding_text().to_string()).collect();
    let vectors: Vec<Result<Vec<f32>, EmbeddingError>> = match self.embedder.embed_batch(&texts).await {
      Ok(vectors) => vectors.into_iter().map(Ok).collect(),
      Err(e) => {
        bentley::warn!("Batch embedding failed, falling back to one profile at a time: {e}");
        let mut single = Vec::with_capacity(live.len());
        for text in &texts {
          single.push(self.embedder.embed(text).await);
        }
        single
      }
    };

    let mut indexed = 0;
    for (profile, vector) in live.into_iter().zip(vectors) {
      let outcome = match vector {
        Ok(vector) => self.store_vector(profile, vector).await,
        Err(source) => Err(IndexError::Embedding { profile_id: profile.id.clone(), source }),
      };
      match outcome {
        Ok(()) => indexed += 1,
        Err(e) => bentley::warn!("Skipping profile during reindex: {e}"),
      }
    }
    indexed
  }

  async fn store_vector(&self, profile: &Profile, vector: Vec<f32>) -> Result<(), IndexError> {
    self
      .vectors
      .upsert(VectorRecord { vector, payload: payload_for(profile) })
      .await
      .map_err(|source| IndexError::VectorDb { profile_id: profile.id.clone(), source })
  }

  /// Embed search text once per request
  pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.embedder.embed(text).await
  }

  /// Filtered nearest-neighbour lookup; unavailable until bootstrapped
  pub async fn find_candidates(
    &self,
    vector: &[f32],
    filter: &VectorFilter,
    limit: usize,
  ) -> Result<Vec<ScoredCandidate>, VectorDbError> {
    if !self.is_ready() {
      return Err(VectorDbError::Unavailable("vector collection is not ready".to_string()));
    }
    self.vectors.search(vector, filter, limit).await
  }
}

pub fn payload_for(profile: &Profile) -> VectorPayload {
  VectorPayload {
    profile_id: profile.id.clone(),
    organization_id: profile.organization_id.clone(),
    team: profile.team.clone(),
    level: profile.level.clone(),
    location: profile.location.clone(),
  }
}
