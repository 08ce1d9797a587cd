//! Database connection management for LanceDB

use std::path::Path;

use lancedb::{connect, Connection};

use crate::error::VectorDbError;

/// Create a LanceDB connection, creating the data directory if needed
pub async fn create_connection(data_dir: &Path) -> Result<Connection, VectorDbError> {
  ensure_data_directory_exists(data_dir)?;

  connect(&data_dir.to_string_lossy())
    .execute()
    .await
    .map_err(|e| VectorDbError::Unavailable(format!("Failed to connect to LanceDB: {e}")))
}

fn ensure_data_directory_exists(data_dir: &Path) -> Result<(), VectorDbError> {
  if data_dir.exists() && !data_dir.is_dir() {
    return Err(VectorDbError::Unavailable(format!("{} is not a directory", data_dir.display())));
  }
  if !data_dir.exists() {
    std::fs::create_dir_all(data_dir).map_err(|e| {
      VectorDbError::Unavailable(format!("Failed to create data directory {}: {e}", data_dir.display()))
    })?;
  }
  Ok(())
}
