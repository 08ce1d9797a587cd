//! LanceDB-backed vector database
//!
//! Profile vectors live in one table keyed by point id, with a BTree index on
//! `profile_id`, cosine distance for search, and filters pushed down as SQL.

pub mod connection;
pub mod records;
pub mod search;
pub mod table_manager;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::VectorDbError;
use crate::server::models::search::ScoredCandidate;
use crate::server::services::vector_database::{point_id, VectorDatabase, VectorFilter, VectorRecord};
use connection::create_connection;
use search::search_candidates;
use table_manager::TableManager;

/// LanceDB implementation of the VectorDatabase trait.
///
/// The connection is opened by the first `ensure_collection`, so an unreachable
/// store surfaces as an unavailable collection instead of a startup failure.
pub struct LanceDbVectorDatabase {
  data_dir: PathBuf,
  table_name: String,
  tables: OnceCell<TableManager>,
  // 0 until the collection has been ensured
  dimension: AtomicUsize,
}

impl LanceDbVectorDatabase {
  pub fn new(data_dir: &Path, table_name: &str) -> Self {
    Self {
      data_dir: data_dir.to_path_buf(),
      table_name: table_name.to_string(),
      tables: OnceCell::new(),
      dimension: AtomicUsize::new(0),
    }
  }

  async fn connect(&self) -> Result<&TableManager, VectorDbError> {
    self
      .tables
      .get_or_try_init(|| async {
        let connection = create_connection(&self.data_dir).await?;
        Ok::<_, VectorDbError>(TableManager::new(connection, self.table_name.clone()))
      })
      .await
  }

  // Only reachable after ensure_collection has connected
  fn tables(&self) -> Result<&TableManager, VectorDbError> {
    self.tables.get().ok_or_else(|| VectorDbError::Unavailable("collection has not been created".to_string()))
  }

  fn dimension(&self) -> Result<usize, VectorDbError> {
    match self.dimension.load(Ordering::Acquire) {
      0 => Err(VectorDbError::Unavailable("collection has not been created".to_string())),
      dimension => Ok(dimension),
    }
  }

  fn check_dimension(&self, actual: usize) -> Result<usize, VectorDbError> {
    let expected = self.dimension()?;
    if expected != actual {
      return Err(VectorDbError::DimensionMismatch { expected, actual });
    }
    Ok(expected)
  }
}

#[async_trait]
impl VectorDatabase for LanceDbVectorDatabase {
  async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDbError> {
    let tables = self.connect().await?;
    let existing = tables.ensure_table(dimension).await?;
    if existing != dimension {
      return Err(VectorDbError::DimensionMismatch { expected: existing, actual: dimension });
    }

    // Scalar indices cannot always be trained on an empty table; searches still work without it
    if let Err(e) = tables.ensure_profile_index().await {
      bentley::warn!("Profile id index on '{}' not created yet: {e}", tables.table_name());
    }

    self.dimension.store(dimension, Ordering::Release);
    Ok(())
  }

  async fn upsert(&self, record: VectorRecord) -> Result<(), VectorDbError> {
    let dimension = self.check_dimension(record.vector.len())?;
    self.tables()?.upsert(std::slice::from_ref(&record), dimension).await
  }

  async fn delete(&self, profile_id: &str) -> Result<(), VectorDbError> {
    self.dimension()?;
    self.tables()?.delete_point(&point_id(profile_id).to_string()).await
  }

  async fn search(
    &self,
    vector: &[f32],
    filter: &VectorFilter,
    limit: usize,
  ) -> Result<Vec<ScoredCandidate>, VectorDbError> {
    self.check_dimension(vector.len())?;
    let table = self.tables()?.get_table().await?;
    search_candidates(&table, vector, filter.to_sql(), limit).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::server::services::vector_database::VectorPayload;
  use std::sync::Arc;
  use tempfile::TempDir;

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

  #[tokio::test]
  async fn bootstrap_upsert_search_delete() {
    let dir = TempDir::new().unwrap();
    let db = LanceDbVectorDatabase::new(dir.path(), "profiles");
    db.ensure_collection(3).await.unwrap();
    db.ensure_collection(3).await.unwrap();

    db.upsert(record("a", "eng", vec![1.0, 0.0, 0.0])).await.unwrap();
    db.upsert(record("b", "ops", vec![0.0, 1.0, 0.0])).await.unwrap();
    db.upsert(record("a", "eng", vec![0.9, 0.1, 0.0])).await.unwrap();

    let all = db.search(&[1.0, 0.0, 0.0], &VectorFilter::default(), 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].profile_id, "a");

    let eng = VectorFilter { teams: vec!["eng".into()], ..Default::default() };
    let filtered = db.search(&[0.0, 1.0, 0.0], &eng, 10).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].profile_id, "a");

    db.delete("a").await.unwrap();
    db.delete("never-indexed").await.unwrap();
    let remaining = db.search(&[1.0, 0.0, 0.0], &VectorFilter::default(), 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].profile_id, "b");
  }

  #[tokio::test]
  async fn reopening_with_another_dimension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = LanceDbVectorDatabase::new(dir.path(), "profiles");
    db.ensure_collection(3).await.unwrap();

    let reopened = LanceDbVectorDatabase::new(dir.path(), "profiles");
    assert!(matches!(
      reopened.ensure_collection(4).await,
      Err(VectorDbError::DimensionMismatch { expected: 3, actual: 4 })
    ));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_bootstrap_and_upserts_all_land() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(LanceDbVectorDatabase::new(dir.path(), "profiles"));

    let bootstraps: Vec<_> = (0..8)
      .map(|_| {
        let db = db.clone();
        tokio::spawn(async move { db.ensure_collection(3).await })
      })
      .collect();
    for bootstrap in bootstraps {
      bootstrap.await.unwrap().unwrap();
    }

    let upserts: Vec<_> = (0..16)
      .map(|i| {
        let db = db.clone();
        tokio::spawn(async move { db.upsert(record(&format!("p{i}"), "eng", vec![1.0, i as f32, 0.0])).await })
      })
      .collect();
    for upsert in upserts {
      upsert.await.unwrap().unwrap();
    }

    assert_eq!(db.tables().unwrap().count_rows().await.unwrap(), 16);
  }

  #[tokio::test]
  async fn unusable_directory_leaves_the_collection_unavailable() {
    let dir = TempDir::new().unwrap();
    let blocked = dir.path().join("vectors");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let db = LanceDbVectorDatabase::new(&blocked, "profiles");
    assert!(matches!(db.ensure_collection(3).await, Err(VectorDbError::Unavailable(_))));
    assert!(matches!(
      db.upsert(record("a", "eng", vec![1.0, 0.0, 0.0])).await,
      Err(VectorDbError::Unavailable(_))
    ));
  }
}
