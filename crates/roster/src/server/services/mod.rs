pub mod embeddings;
pub mod explanations;
pub mod memory_vectors;
pub mod profile_index;
pub mod result_sink;
pub mod search;
pub mod vector_database;

#[cfg(feature = "lancedb")]
pub mod lancedb;
