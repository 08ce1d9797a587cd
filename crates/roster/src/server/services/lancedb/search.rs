//! Vector search operations and result processing for LanceDB

use arrow::array::{Array, Float32Array, StringArray};
use arrow::record_batch::RecordBatch;
use futures::stream::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use super::records::{PROFILE_ID, VECTOR};
use crate::error::VectorDbError;
use crate::server::models::search::ScoredCandidate;

/// Cosine nearest-neighbour search with an optional SQL pre-filter
pub async fn search_candidates(
  table: &Table,
  vector: &[f32],
  filter: Option<String>,
  limit: usize,
) -> Result<Vec<ScoredCandidate>, VectorDbError> {
  let mut query = table
    .vector_search(vector)
    .map_err(|e| VectorDbError::unavailable(format!("Invalid vector query: {e}")))?
    .column(VECTOR)
    .distance_type(DistanceType::Cosine)
    .limit(limit);
  if let Some(predicate) = filter {
    query = query.only_if(predicate);
  }

  let mut stream = query
    .execute()
    .await
    .map_err(|e| VectorDbError::unavailable(format!("Vector search failed: {e}")))?;

  let mut candidates = Vec::new();
  while let Some(batch) = stream.next().await {
    let batch = batch.map_err(|e| VectorDbError::unavailable(format!("Error reading batch: {e}")))?;
    candidates.extend(process_result_batch(&batch)?);
  }

  // Batches are individually ordered; merge them
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  candidates.truncate(limit);
  Ok(candidates)
}

fn process_result_batch(batch: &RecordBatch) -> Result<Vec<ScoredCandidate>, VectorDbError> {
  let ids = batch
    .column_by_name(PROFILE_ID)
    .and_then(|col| col.as_any().downcast_ref::<StringArray>())
    .ok_or_else(|| VectorDbError::unavailable(format!("Missing '{PROFILE_ID}' column")))?;
  let distances = batch.column_by_name("_distance").and_then(|col| col.as_any().downcast_ref::<Float32Array>());

  Ok(
    (0..batch.num_rows())
      .filter(|&row| !ids.is_null(row))
      .map(|row| ScoredCandidate {
        profile_id: ids.value(row).to_string(),
        score: distance_to_similarity(distance_at(distances, row)),
      })
      .collect(),
  )
}

fn distance_at(distances: Option<&Float32Array>, row: usize) -> f32 {
  match distances {
    Some(array) if row < array.len() && !array.is_null(row) => array.value(row),
    // Unknown distance ranks last
    _ => 2.0,
  }
}

/// Cosine distance is `1 - cos`, so similarity is its complement
pub fn distance_to_similarity(distance: f32) -> f32 {
  1.0 - distance
}
