//! REST API types with schemars annotations for schema generation

use axum::{
  http::StatusCode,
  response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SearchError;
use crate::server::models::conversation::{Conversation, Message};
use crate::server::models::profile::{NamedRef, Profile, ProfileEvent};

// Base Response Structure
// ======================

/// Base response object for all API endpoints
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BaseResponse<T> {
  /// API versioning information
  pub versioning: VersionInfo,

  /// Transaction ID for logging correlation
  pub transaction_id: Uuid,

  /// Optional error information
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub errors: Vec<ApiError>,

  /// Response data (generic for different endpoint types)
  #[serde(flatten)]
  pub data: T,
}

/// API versioning information
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionInfo {
  pub latest: String,
  pub requested: String,
  pub resolved: String,
}

/// API error information
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
  /// Error key, unique to the error source
  pub key: String,

  /// Human readable error message
  pub message: String,

  /// Additional error context
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub context: serde_json::Value,
}

/// A failed request: status code plus an error envelope
#[derive(Debug)]
pub struct ApiFailure {
  pub status: StatusCode,
  pub body: BaseResponse<()>,
}

// Status/Version Endpoints
// =======================

/// Response for /status endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
  pub status: String,
  pub version: String,
  /// Whether the vector collection has been bootstrapped
  pub search_ready: bool,
  pub data_dir: String,
}

/// Response for /version endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct VersionResponse {
  pub version: String,
}

/// Response for /api endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiInfoResponse {
  pub latest: String,
  pub versions: ApiVersions,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiVersions {
  pub latest: String,
  pub active: Vec<String>,
}

// Logs Endpoint
// =============

/// Response for /logs endpoint
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LogsResponse {
  pub logs: Vec<LogEntry>,
}

pub type LogEntry = bentley::daemon_logs::LogEntry;

// Search Endpoints
// ================

/// Response for POST /api/v1/reindex
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReindexResponse {
  /// Profiles embedded and stored successfully
  pub reindexed: usize,
}

// Conversation Endpoints
// ======================

/// Request for POST /api/v1/chat
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateChatRequest {
  /// Opening message; becomes the conversation title
  pub message: String,
}

/// Response for POST /api/v1/chat
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
  pub id: String,
  pub title: String,
  pub created_at: DateTime<Utc>,
}

/// Response for GET /api/v1/chat/history
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ChatHistoryResponse {
  pub conversations: Vec<Conversation>,
}

/// Response for GET /api/v1/chat/{id}
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ChatDetailResponse {
  pub conversation: Conversation,
  pub messages: Vec<Message>,
}

// Sync Endpoints
// ==============

/// Request for POST /api/v1/sync/profiles
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyncProfileRequest {
  pub event: ProfileEvent,
  pub profile: Profile,
}

/// Request for PUT /api/v1/sync/organizations
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyncOrganizationRequest {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub teams: Vec<NamedRef>,
  #[serde(default)]
  pub levels: Vec<NamedRef>,
  #[serde(default)]
  pub locations: Vec<NamedRef>,
}

/// Acknowledgement for sync endpoints
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SyncResponse {
  pub accepted: bool,
}

// Helper Functions
// ================

fn version_info() -> VersionInfo {
  let version = env!("CARGO_PKG_VERSION");
  VersionInfo {
    latest: version.to_string(),
    requested: version.to_string(),
    resolved: version.to_string(),
  }
}

impl<T> BaseResponse<T> {
  /// Create a successful response
  pub fn success(data: T, transaction_id: Uuid) -> Self {
    Self { versioning: version_info(), transaction_id, errors: Vec::new(), data }
  }

  /// Create an error response
  pub fn error(errors: Vec<ApiError>, transaction_id: Uuid) -> BaseResponse<()> {
    BaseResponse { versioning: version_info(), transaction_id, errors, data: () }
  }
}

impl ApiError {
  pub fn new(key: &str, message: &str) -> Self {
    Self { key: key.to_string(), message: message.to_string(), context: serde_json::Value::Null }
  }
}

impl ApiFailure {
  pub fn new(status: StatusCode, key: &str, message: &str, transaction_id: Uuid) -> Self {
    Self {
      status,
      body: BaseResponse::<()>::error(vec![ApiError::new(key, message)], transaction_id),
    }
  }

  pub fn bad_request(key: &str, message: &str, transaction_id: Uuid) -> Self {
    Self::new(StatusCode::BAD_REQUEST, key, message, transaction_id)
  }

  pub fn unauthorized(message: &str) -> Self {
    Self::new(StatusCode::UNAUTHORIZED, "missing_identity", message, Uuid::new_v4())
  }

  pub fn not_found(key: &str, message: &str, transaction_id: Uuid) -> Self {
    Self::new(StatusCode::NOT_FOUND, key, message, transaction_id)
  }

  pub fn internal(key: &str, message: &str, transaction_id: Uuid) -> Self {
    Self::new(StatusCode::INTERNAL_SERVER_ERROR, key, message, transaction_id)
  }

  pub fn from_search_error(err: &SearchError, transaction_id: Uuid) -> Self {
    let status = match err {
      SearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      SearchError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
      SearchError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    Self::new(status, err.key(), &err.to_string(), transaction_id)
  }
}

impl IntoResponse for ApiFailure {
  fn into_response(self) -> Response {
    (self.status, Json(self.body)).into_response()
  }
}
