//! Table management operations for LanceDB

use arrow::record_batch::RecordBatchIterator;
use lancedb::index::{scalar::BTreeIndexBuilder, Index};
use lancedb::{Connection, Table};
use tokio::sync::Mutex;

use super::records::{profile_vector_schema, records_to_batch, schema_dimension, POINT_ID, PROFILE_ID};
use crate::error::VectorDbError;
use crate::server::services::vector_database::{sql_literal, VectorRecord};

/// Table manager for LanceDB operations.
/// Writes from one process are serialized so concurrent commits never conflict.
pub struct TableManager {
  connection: Connection,
  table_name: String,
  write_lock: Mutex<()>,
}

impl TableManager {
  pub fn new(connection: Connection, table_name: String) -> Self {
    Self { connection, table_name, write_lock: Mutex::new(()) }
  }

  pub fn table_name(&self) -> &str {
    &self.table_name
  }

  pub async fn table_exists(&self) -> Result<bool, VectorDbError> {
    let tables = self
      .connection
      .table_names()
      .execute()
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to list tables: {e}")))?;
    Ok(tables.contains(&self.table_name))
  }

  pub async fn get_table(&self) -> Result<Table, VectorDbError> {
    self
      .connection
      .open_table(&self.table_name)
      .execute()
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to open table '{}': {e}", self.table_name)))
  }

  /// Create the table if absent, returning the dimension it was created with.
  /// A concurrent creator winning the race counts as success.
  pub async fn ensure_table(&self, dimension: usize) -> Result<usize, VectorDbError> {
    let _write = self.write_lock.lock().await;
    if !self.table_exists().await? {
      let created = self
        .connection
        .create_empty_table(&self.table_name, profile_vector_schema(dimension))
        .execute()
        .await;

      match created {
        Ok(_) => bentley::info!("Created vector table '{}' with dimension {dimension}", self.table_name),
        Err(lancedb::Error::TableAlreadyExists { .. }) => {}
        Err(e) => {
          return Err(VectorDbError::unavailable(format!(
            "Failed to create table '{}': {e}",
            self.table_name
          )))
        }
      }
    }

    self.table_dimension().await
  }

  /// Dimension recorded in the existing table's vector column
  pub async fn table_dimension(&self) -> Result<usize, VectorDbError> {
    let table = self.get_table().await?;
    let schema = table
      .schema()
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to read table schema: {e}")))?;
    schema_dimension(&schema)
      .ok_or_else(|| VectorDbError::unavailable(format!("Table '{}' has no vector column", self.table_name)))
  }

  /// Ensure a scalar index exists on the profile id column
  pub async fn ensure_profile_index(&self) -> Result<(), VectorDbError> {
    let _write = self.write_lock.lock().await;
    let table = self.get_table().await?;
    let indices = table
      .list_indices()
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to list indices: {e}")))?;
    if indices.iter().any(|index| index.columns.iter().any(|c| c == PROFILE_ID)) {
      return Ok(());
    }

    table
      .create_index(&[PROFILE_ID], Index::BTree(BTreeIndexBuilder::default()))
      .execute()
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to index '{PROFILE_ID}': {e}")))?;
    bentley::info!("Created '{PROFILE_ID}' index on '{}'", self.table_name);
    Ok(())
  }

  /// Insert or replace records keyed by point id
  pub async fn upsert(&self, records: &[VectorRecord], dimension: usize) -> Result<(), VectorDbError> {
    let batch = records_to_batch(records, dimension)?;
    let schema = batch.schema();
    let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

    let _write = self.write_lock.lock().await;
    let table = self.get_table().await?;
    let mut merge = table.merge_insert(&[POINT_ID]);
    merge.when_matched_update_all(None).when_not_matched_insert_all();
    merge
      .execute(Box::new(reader))
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to upsert vectors: {e}")))?;
    Ok(())
  }

  pub async fn delete_point(&self, point_id: &str) -> Result<(), VectorDbError> {
    let _write = self.write_lock.lock().await;
    let table = self.get_table().await?;
    table
      .delete(&format!("{POINT_ID} = {}", sql_literal(point_id)))
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to delete vector: {e}")))?;
    Ok(())
  }

  pub async fn count_rows(&self) -> Result<usize, VectorDbError> {
    let table = self.get_table().await?;
    table
      .count_rows(None)
      .await
      .map_err(|e| VectorDbError::unavailable(format!("Failed to count rows: {e}")))
  }
}
