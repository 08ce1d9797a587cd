//! REST API module for the roster service
//!
//! Uses axum for routing and schemars for schema generation. Handlers reach
//! the pipeline through [`startup::AppState`].

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routing;
pub mod services;
pub mod startup;
pub mod types;
