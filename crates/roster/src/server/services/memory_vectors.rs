//! In-process vector database using brute-force cosine similarity

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::VectorDbError;
use crate::server::models::search::ScoredCandidate;
use crate::server::services::vector_database::{point_id, VectorDatabase, VectorFilter, VectorRecord};

#[derive(Default)]
struct Collection {
  dimension: Option<usize>,
  records: HashMap<Uuid, VectorRecord>,
}

#[derive(Default)]
pub struct MemoryVectorDatabase {
  inner: RwLock<Collection>,
}

impl MemoryVectorDatabase {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.inner.read().await.records.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }

  pub async fn contains(&self, profile_id: &str) -> bool {
    self.inner.read().await.records.contains_key(&point_id(profile_id))
  }
}

fn require_dimension(collection: &Collection, actual: usize) -> Result<(), VectorDbError> {
  match collection.dimension {
    None => Err(VectorDbError::Unavailable("collection has not been created".to_string())),
    Some(expected) if expected != actual => Err(VectorDbError::DimensionMismatch { expected, actual }),
    Some(_) => Ok(()),
  }
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorDatabase for MemoryVectorDatabase {
  async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDbError> {
    let mut collection = self.inner.write().await;
    match collection.dimension {
      None => {
        collection.dimension = Some(dimension);
        Ok(())
      }
      Some(existing) if existing == dimension => Ok(()),
      Some(existing) => Err(VectorDbError::DimensionMismatch { expected: existing, actual: dimension }),
    }
  }

  async fn upsert(&self, record: VectorRecord) -> Result<(), VectorDbError> {
    let mut collection = self.inner.write().await;
    require_dimension(&collection, record.vector.len())?;
    collection.records.insert(record.point_id(), record);
    Ok(())
  }

  async fn delete(&self, profile_id: &str) -> Result<(), VectorDbError> {
    let mut collection = self.inner.write().await;
    if collection.dimension.is_none() {
      return Err(VectorDbError::Unavailable("collection has not been created".to_string()));
    }
    collection.records.remove(&point_id(profile_id));
    Ok(())
  }

  async fn search(
    &self,
    vector: &[f32],
    filter: &VectorFilter,
    limit: usize,
  ) -> Result<Vec<ScoredCandidate>, VectorDbError> {
    let collection = self.inner.read().await;
    require_dimension(&collection, vector.len())?;

    let mut scored: Vec<ScoredCandidate> = collection
      .records
      .values()
      .filter(|record| filter.matches(&record.payload))
      .map(|record| ScoredCandidate {
        profile_id: record.payload.profile_id.clone(),
        score: cosine_similarity(vector, &record.vector),
      })
      .collect();

    // Ties broken by id so results are deterministic
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.profile_id.cmp(&b.profile_id)));
    scored.truncate(limit);
    Ok(scored)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::server::services::vector_database::VectorPayload;

  fn record(id: &str, team: &str, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
      vector,
      payload: VectorPayload {
        profile_id: id.into(),
        organization_id: "org".into(),
        team: Some(team.into()),
        ..Default::default()
      },
    }
  }

  #[test]
  fn cosine_of_parallel_and_orthogonal_vectors() {
    assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
  }

  #[tokio::test]
  async fn ensure_collection_is_idempotent_but_checks_dimension() {
    let db = MemoryVectorDatabase::new();
    db.ensure_collection(3).await.unwrap();
    db.ensure_collection(3).await.unwrap();
    assert!(matches!(db.ensure_collection(4).await, Err(VectorDbError::DimensionMismatch { .. })));
  }

  #[tokio::test]
  async fn operations_before_bootstrap_are_unavailable() {
    let db = MemoryVectorDatabase::new();
    assert!(matches!(
      db.search(&[1.0], &VectorFilter::default(), 5).await,
      Err(VectorDbError::Unavailable(_))
    ));
  }

  #[tokio::test]
  async fn upsert_replaces_and_search_orders_by_similarity() {
    let db = MemoryVectorDatabase::new();
    db.ensure_collection(2).await.unwrap();
    db.upsert(record("a", "eng", vec![1.0, 0.0])).await.unwrap();
    db.upsert(record("b", "eng", vec![0.7, 0.7])).await.unwrap();
    db.upsert(record("a", "eng", vec![0.0, 1.0])).await.unwrap();
    assert_eq!(db.len().await, 2);

    let results = db.search(&[1.0, 0.0], &VectorFilter::default(), 10).await.unwrap();
    let ids: Vec<_> = results.iter().map(|c| c.profile_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
  }

  #[tokio::test]
  async fn filters_are_applied_before_the_limit() {
    let db = MemoryVectorDatabase::new();
    db.ensure_collection(2).await.unwrap();
    db.upsert(record("close", "ops", vec![1.0, 0.0])).await.unwrap();
    db.upsert(record("far", "eng", vec![0.0, 1.0])).await.unwrap();

    let filter = VectorFilter { teams: vec!["eng".into()], ..Default::default() };
    let results = db.search(&[1.0, 0.0], &filter, 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].profile_id, "far");
  }

  #[tokio::test]
  async fn deleting_unknown_ids_succeeds() {
    let db = MemoryVectorDatabase::new();
    db.ensure_collection(2).await.unwrap();
    db.delete("ghost").await.unwrap();
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_bootstrap_and_upserts_all_land() {
    let db = std::sync::Arc::new(MemoryVectorDatabase::new());

    let mut tasks = Vec::new();
    for _ in 0..8 {
      let db = db.clone();
      tasks.push(tokio::spawn(async move { db.ensure_collection(3).await }));
    }
    for task in tasks.drain(..) {
      task.await.unwrap().unwrap();
    }

    for i in 0..16 {
      let db = db.clone();
      tasks.push(tokio::spawn(async move { db.upsert(record(&format!("p{i}"), "eng", vec![1.0, i as f32, 0.0])).await }));
    }
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    assert_eq!(db.len().await, 16);
  }
}
