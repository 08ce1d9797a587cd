//! Logs endpoint handler

use axum::{extract::Extension, response::Json};
use uuid::Uuid;

use crate::server::{
  middleware::RequestContext,
  types::{ApiFailure, BaseResponse, LogsResponse},
};

const RECENT_LOG_LIMIT: usize = 100;

/// GET /logs - Most recent request log entries
pub async fn get_logs(
  Extension(context): Extension<RequestContext>,
) -> Result<Json<BaseResponse<LogsResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();

  match context.logger.get_logs(Some(RECENT_LOG_LIMIT), None).await {
    Ok(logs) => Ok(Json(BaseResponse::success(LogsResponse { logs }, transaction_id))),
    Err(e) => {
      context.log_error(&format!("Failed to read logs: {e}"), "logs-api").await;
      Err(ApiFailure::internal("logs_read_failed", &format!("Failed to read logs: {e}"), transaction_id))
    }
  }
}
