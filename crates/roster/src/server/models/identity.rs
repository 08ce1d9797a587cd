//! Caller identity supplied by the upstream identity provider

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

use crate::server::types::ApiFailure;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";

/// Authenticated caller; `user_id` is also the caller's own profile id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub user_id: String,
  pub organization_id: String,
}

impl Identity {
  pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), organization_id: organization_id.into() }
  }

  /// Read identity headers; `None` when either is missing, blank or not UTF-8
  pub fn from_headers(headers: &axum::http::HeaderMap) -> Option<Self> {
    let read = |name: &str| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
    };
    Some(Self { user_id: read(USER_ID_HEADER)?, organization_id: read(ORGANIZATION_ID_HEADER)? })
  }
}

impl<S> FromRequestParts<S> for Identity
where
  S: Send + Sync,
{
  type Rejection = ApiFailure;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Self::from_headers(&parts.headers).ok_or_else(|| {
      ApiFailure::unauthorized("Requests must carry x-user-id and x-organization-id headers")
    })
  }
}
