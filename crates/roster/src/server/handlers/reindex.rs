//! Bulk reindex endpoint

use axum::{
  extract::{Extension, State},
  http::StatusCode,
  response::Json,
};
use uuid::Uuid;

use crate::error::IndexError;
use crate::server::middleware::RequestContext;
use crate::server::models::identity::Identity;
use crate::server::startup::AppState;
use crate::server::types::{ApiFailure, BaseResponse, ReindexResponse};

/// POST /api/v1/reindex - Re-embed every profile in the caller's organization
pub async fn reindex(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
) -> Result<Json<BaseResponse<ReindexResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  if !state.index.is_ready() {
    return Err(ApiFailure::new(
      StatusCode::SERVICE_UNAVAILABLE,
      "search_backend_unavailable",
      "Vector collection is not ready",
      transaction_id,
    ));
  }

  context.log_info(&format!("Reindexing organization {}", identity.organization_id), "reindex-api").await;

  match state.index.reindex_organization(&identity.organization_id).await {
    Ok(reindexed) => {
      context.log_success(&format!("Reindexed {reindexed} profiles"), "reindex-api").await;
      Ok(Json(BaseResponse::success(ReindexResponse { reindexed }, transaction_id)))
    }
    Err(e) => {
      context.log_error(&format!("Reindex failed: {e}"), "reindex-api").await;
      let status = match e {
        IndexError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        IndexError::Embedding { .. } | IndexError::VectorDb { .. } => StatusCode::SERVICE_UNAVAILABLE,
      };
      Err(ApiFailure::new(status, "reindex_failed", &e.to_string(), transaction_id))
    }
  }
}
