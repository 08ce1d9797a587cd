//! Sync endpoints used by the CRUD layer to mirror profile and organization changes

use axum::{
  extract::{Extension, Json, State},
  response::Json as ResponseJson,
};
use uuid::Uuid;

use crate::server::middleware::RequestContext;
use crate::server::models::identity::Identity;
use crate::server::models::profile::{Organization, ProfileEvent};
use crate::server::startup::AppState;
use crate::server::types::{ApiFailure, BaseResponse, SyncOrganizationRequest, SyncProfileRequest, SyncResponse};

/// POST /api/v1/sync/profiles - Record a profile change and update the index
pub async fn sync_profile(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
  Json(request): Json<SyncProfileRequest>,
) -> Result<ResponseJson<BaseResponse<SyncResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  let SyncProfileRequest { event, profile } = request;

  if profile.organization_id != identity.organization_id {
    return Err(ApiFailure::bad_request(
      "organization_mismatch",
      "Profile belongs to a different organization than the caller",
      transaction_id,
    ));
  }

  let stored = match event {
    ProfileEvent::Deleted => state.profiles.delete_profile(&profile.id).await,
    _ => state.profiles.save_profile(&profile).await,
  };
  if let Err(e) = stored {
    context.log_error(&format!("Failed to store profile {}: {e:#}", profile.id), "sync-api").await;
    return Err(ApiFailure::internal("profile_sync_failed", "Failed to store profile", transaction_id));
  }

  // Index drift is repaired by reindexing, so indexing failures stay out of the response
  state.index.on_profile_event(event, &profile).await;
  context.log_info(&format!("Synced profile {} ({event:?})", profile.id), "sync-api").await;

  Ok(ResponseJson(BaseResponse::success(SyncResponse { accepted: true }, transaction_id)))
}

/// PUT /api/v1/sync/organizations - Replace an organization's reference data
pub async fn sync_organization(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
  Json(request): Json<SyncOrganizationRequest>,
) -> Result<ResponseJson<BaseResponse<SyncResponse>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();
  if request.id != identity.organization_id {
    return Err(ApiFailure::bad_request(
      "organization_mismatch",
      "Callers may only sync their own organization",
      transaction_id,
    ));
  }

  let organization = Organization {
    id: request.id,
    title: request.title,
    teams: request.teams,
    levels: request.levels,
    locations: request.locations,
  };

  match state.profiles.save_organization(&organization).await {
    Ok(()) => {
      context.log_info(&format!("Synced organization {}", organization.id), "sync-api").await;
      Ok(ResponseJson(BaseResponse::success(SyncResponse { accepted: true }, transaction_id)))
    }
    Err(e) => {
      context.log_error(&format!("Failed to store organization: {e:#}"), "sync-api").await;
      Err(ApiFailure::internal("organization_sync_failed", "Failed to store organization", transaction_id))
    }
  }
}
