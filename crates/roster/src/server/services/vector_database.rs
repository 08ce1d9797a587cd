//! Vector database abstraction for profile embeddings
//!
//! One named collection holds a vector per profile. Implementations must treat
//! `ensure_collection` as idempotent, `upsert` as replace-by-id, `delete` of an
//! unknown id as success, and must evaluate filters themselves rather than
//! leaving them to the caller.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::VectorDbError;
use crate::server::models::search::ScoredCandidate;

/// Engine key for a profile: the first 128 bits of SHA-256 over the profile id
pub fn point_id(profile_id: &str) -> Uuid {
  let digest = Sha256::digest(profile_id.as_bytes());
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&digest[..16]);
  Uuid::from_bytes(bytes)
}

/// Metadata stored alongside each vector and used for filtering
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorPayload {
  pub profile_id: String,
  pub organization_id: String,
  pub team: Option<String>,
  pub level: Option<String>,
  pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
  pub vector: Vec<f32>,
  pub payload: VectorPayload,
}

impl VectorRecord {
  pub fn point_id(&self) -> Uuid {
    point_id(&self.payload.profile_id)
  }
}

/// Structural predicate: AND across fields, OR within a field; empty lists match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
  pub organization_id: Option<String>,
  pub teams: Vec<String>,
  pub levels: Vec<String>,
  pub locations: Vec<String>,
}

impl VectorFilter {
  pub fn matches(&self, payload: &VectorPayload) -> bool {
    fn any_of(values: &[String], field: &Option<String>) -> bool {
      values.is_empty() || field.as_ref().is_some_and(|v| values.contains(v))
    }

    self.organization_id.as_ref().is_none_or(|org| *org == payload.organization_id)
      && any_of(&self.teams, &payload.team)
      && any_of(&self.levels, &payload.level)
      && any_of(&self.locations, &payload.location)
  }

  /// SQL predicate for engines that accept one; `None` when nothing is filtered
  pub fn to_sql(&self) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(org) = &self.organization_id {
      clauses.push(format!("organization_id = {}", sql_literal(org)));
    }
    for (column, values) in [("team", &self.teams), ("level", &self.levels), ("location", &self.locations)] {
      if !values.is_empty() {
        let list: Vec<String> = values.iter().map(|v| sql_literal(v)).collect();
        clauses.push(format!("{column} IN ({})", list.join(", ")));
      }
    }

    if clauses.is_empty() {
      None
    } else {
      Some(clauses.join(" AND "))
    }
  }
}

/// Single-quoted SQL string literal
pub fn sql_literal(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

/// Vector database interface for storing and searching profile embeddings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorDatabase: Send + Sync {
  /// Create the collection with cosine distance and a profile-id index if absent
  async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDbError>;

  /// Insert or replace the record for the payload's profile id
  async fn upsert(&self, record: VectorRecord) -> Result<(), VectorDbError>;

  /// Remove a profile's record; unknown ids are not an error
  async fn delete(&self, profile_id: &str) -> Result<(), VectorDbError>;

  /// Up to `limit` candidates matching `filter`, most similar first
  async fn search(
    &self,
    vector: &[f32],
    filter: &VectorFilter,
    limit: usize,
  ) -> Result<Vec<ScoredCandidate>, VectorDbError>;
}
