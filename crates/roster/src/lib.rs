//! Roster - semantic people search
//!
//! Member profiles are embedded into a vector index; free-text queries are
//! matched against it, hydrated, explained by a language model, and streamed
//! back to the caller while each delivered match is recorded against a
//! conversation.

pub mod config;
pub mod error;
pub mod server;
