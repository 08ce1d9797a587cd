//! Arrow schema and RecordBatch conversion for profile vectors

use std::sync::Arc;

use arrow::array::{Array, FixedSizeListBuilder, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::VectorDbError;
use crate::server::services::vector_database::VectorRecord;

pub const POINT_ID: &str = "point_id";
pub const PROFILE_ID: &str = "profile_id";
pub const ORGANIZATION_ID: &str = "organization_id";
pub const TEAM: &str = "team";
pub const LEVEL: &str = "level";
pub const LOCATION: &str = "location";
pub const VECTOR: &str = "vector";

/// Table schema for a collection of the given dimension
pub fn profile_vector_schema(dimension: usize) -> SchemaRef {
  Arc::new(Schema::new(vec![
    Field::new(POINT_ID, DataType::Utf8, false),
    Field::new(PROFILE_ID, DataType::Utf8, false),
    Field::new(ORGANIZATION_ID, DataType::Utf8, false),
    Field::new(TEAM, DataType::Utf8, true),
    Field::new(LEVEL, DataType::Utf8, true),
    Field::new(LOCATION, DataType::Utf8, true),
    Field::new(
      VECTOR,
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
      false,
    ),
  ]))
}

/// Dimension of the vector column in an existing table schema
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
  match schema.field_with_name(VECTOR).ok()?.data_type() {
    DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
    _ => None,
  }
}

/// Convert records into one batch; every vector must have `dimension` entries
pub fn records_to_batch(records: &[VectorRecord], dimension: usize) -> Result<RecordBatch, VectorDbError> {
  if records.is_empty() {
    return Err(VectorDbError::Unavailable("Cannot create RecordBatch from empty records".to_string()));
  }
  if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
    return Err(VectorDbError::DimensionMismatch { expected: dimension, actual: bad.vector.len() });
  }

  let point_ids: StringArray = records.iter().map(|r| Some(r.point_id().to_string())).collect();
  let profile_ids = string_column(records, |r| Some(r.payload.profile_id.as_str()));
  let organization_ids = string_column(records, |r| Some(r.payload.organization_id.as_str()));
  let teams = string_column(records, |r| r.payload.team.as_deref());
  let levels = string_column(records, |r| r.payload.level.as_deref());
  let locations = string_column(records, |r| r.payload.location.as_deref());

  let mut vectors =
    FixedSizeListBuilder::new(Float32Array::builder(dimension * records.len()), dimension as i32);
  for record in records {
    vectors.values().append_slice(&record.vector);
    vectors.append(true);
  }

  let columns: Vec<Arc<dyn Array>> = vec![
    Arc::new(point_ids),
    Arc::new(profile_ids),
    Arc::new(organization_ids),
    Arc::new(teams),
    Arc::new(levels),
    Arc::new(locations),
    Arc::new(vectors.finish()),
  ];

  RecordBatch::try_new(profile_vector_schema(dimension), columns)
    .map_err(|e| VectorDbError::Unavailable(format!("Failed to create RecordBatch: {e}")))
}

fn string_column<F>(records: &[VectorRecord], field: F) -> StringArray
where
  F: Fn(&VectorRecord) -> Option<&str>,
{
  StringArray::from(records.iter().map(field).collect::<Vec<_>>())
}
