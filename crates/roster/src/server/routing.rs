//! Axum router configuration for all endpoints

use axum::{
  middleware,
  routing::{get, post, put},
  Router,
};

use crate::server::handlers::{conversations, logs, reindex, search, status, sync};
use crate::server::middleware::request_context_middleware;
use crate::server::startup::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
  Router::new()
    // Status and version endpoints
    .route("/status", get(status::status))
    .route("/version", get(status::version))
    .route("/api", get(status::api_info))
    .route("/api/schema", get(status::schema))
    // Logs endpoint
    .route("/logs", get(logs::get_logs))
    // Search endpoints
    .route("/api/v1/search", get(search::search))
    .route("/api/v1/reindex", post(reindex::reindex))
    // Conversation endpoints
    .route("/api/v1/chat", post(conversations::create_chat))
    .route("/api/v1/chat/history", get(conversations::chat_history))
    .route("/api/v1/chat/{id}", get(conversations::get_chat))
    // Sync endpoints for the CRUD layer
    .route("/api/v1/sync/profiles", post(sync::sync_profile))
    .route("/api/v1/sync/organizations", put(sync::sync_organization))
    .layer(middleware::from_fn_with_state(state.clone(), request_context_middleware))
    .with_state(state)
}
