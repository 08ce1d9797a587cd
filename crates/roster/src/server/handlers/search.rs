//! Semantic search endpoint streaming results as server-sent events

use std::convert::Infallible;
use std::time::Duration;

use axum::{
  extract::{Extension, RawQuery, State},
  response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::server::middleware::RequestContext;
use crate::server::models::identity::Identity;
use crate::server::models::search::{EnrichedResult, SearchRequest};
use crate::server::startup::AppState;
use crate::server::types::ApiFailure;

pub const RESULT_EVENT: &str = "result";

/// GET /api/v1/search - One `result` event per enriched match, in completion order
pub async fn search(
  State(state): State<AppState>,
  Extension(context): Extension<RequestContext>,
  identity: Identity,
  RawQuery(query): RawQuery,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiFailure> {
  let transaction_id = Uuid::new_v4();

  let request = SearchRequest::from_query(query.as_deref().unwrap_or_default())
    .map_err(|e| ApiFailure::from_search_error(&e, transaction_id))?;

  let results = match state.search.search(&identity, request).await {
    Ok(results) => results,
    Err(e) => {
      context.log_warn(&format!("Search failed: {e}"), "search-api").await;
      return Err(ApiFailure::from_search_error(&e, transaction_id));
    }
  };

  context
    .log_info(
      &format!("Streaming {} results into conversation {}", results.expected(), results.conversation_id()),
      "search-api",
    )
    .await;

  let events = results.filter_map(|result| async move { result_event(&result).map(Ok) });
  Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn result_event(result: &EnrichedResult) -> Option<Event> {
  match Event::default().event(RESULT_EVENT).json_data(result) {
    Ok(event) => Some(event),
    Err(e) => {
      bentley::error!("Failed to encode search result {}: {e}", result.profile.id);
      None
    }
  }
}
