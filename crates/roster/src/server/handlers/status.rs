//! Status, version and schema endpoint handlers

use axum::{extract::State, response::Json};
use schemars::schema::RootSchema;
use uuid::Uuid;

use crate::server::models::search::EnrichedResult;
use crate::server::startup::AppState;
use crate::server::types::{ApiInfoResponse, ApiVersions, BaseResponse, StatusResponse, VersionResponse};

/// GET /status - Health check endpoint
pub async fn status(State(state): State<AppState>) -> Json<BaseResponse<StatusResponse>> {
  let search_ready = state.index.is_ready();
  let response = StatusResponse {
    status: if search_ready { "healthy" } else { "degraded" }.to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    search_ready,
    data_dir: state.config.storage.data_dir.to_string_lossy().to_string(),
  };
  Json(BaseResponse::success(response, Uuid::new_v4()))
}

/// GET /version - Returns current API version
pub async fn version() -> Json<BaseResponse<VersionResponse>> {
  let response = VersionResponse { version: env!("CARGO_PKG_VERSION").to_string() };
  Json(BaseResponse::success(response, Uuid::new_v4()))
}

/// GET /api - Returns API information and supported versions
pub async fn api_info() -> Json<BaseResponse<ApiInfoResponse>> {
  let version = env!("CARGO_PKG_VERSION");
  let response = ApiInfoResponse {
    latest: version.to_string(),
    versions: ApiVersions { latest: version.to_string(), active: vec![version.to_string()] },
  };
  Json(BaseResponse::success(response, Uuid::new_v4()))
}

/// GET /api/schema - JSON schema of a streamed search `result` event
pub async fn schema() -> Json<RootSchema> {
  Json(schemars::schema_for!(EnrichedResult))
}
