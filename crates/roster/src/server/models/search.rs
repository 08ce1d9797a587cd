//! Search request and result value types

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::profile::Profile;
use crate::error::SearchError;

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 20;

/// Normalised query text, structural filters and result limit for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilterSet {
  query: String,
  teams: Vec<String>,
  levels: Vec<String>,
  locations: Vec<String>,
  limit: usize,
}

impl SearchFilterSet {
  /// Filter values may be comma-joined; they are trimmed, emptied values dropped and
  /// duplicates removed. The limit is clamped to `1..=MAX_LIMIT`, with 0 or `None`
  /// meaning `DEFAULT_LIMIT`.
  pub fn new<I, S>(
    query: &str,
    teams: I,
    levels: I,
    locations: I,
    limit: Option<usize>,
  ) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      query: query.trim().to_string(),
      teams: normalize(teams),
      levels: normalize(levels),
      locations: normalize(locations),
      limit: clamp_limit(limit),
    }
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn teams(&self) -> &[String] {
    &self.teams
  }

  pub fn levels(&self) -> &[String] {
    &self.levels
  }

  pub fn locations(&self) -> &[String] {
    &self.locations
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
  match limit {
    None | Some(0) => DEFAULT_LIMIT,
    Some(n) => n.min(MAX_LIMIT),
  }
}

fn normalize<I, S>(values: I) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut out: Vec<String> = Vec::new();
  for value in values {
    for part in value.as_ref().split(',') {
      let part = part.trim();
      if !part.is_empty() && !out.iter().any(|seen| seen == part) {
        out.push(part.to_string());
      }
    }
  }
  out
}

/// A parsed search request: filters plus the conversation to record into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
  pub filters: SearchFilterSet,
  pub conversation_id: String,
}

impl SearchRequest {
  /// Parse a raw query string (`q`, `chatId`, `limit`, `teams`, `levels`, `locations`).
  /// List parameters accept comma-joined values, repeated keys, and the `key[]` form.
  pub fn from_query(raw: &str) -> Result<Self, SearchError> {
    let mut query: Option<String> = None;
    let mut conversation_id: Option<String> = None;
    let mut limit: Option<String> = None;
    let mut teams = Vec::new();
    let mut levels = Vec::new();
    let mut locations = Vec::new();

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
      match key.trim_end_matches("[]") {
        "q" => {
          query.get_or_insert_with(|| value.into_owned());
        }
        "chatId" => {
          conversation_id.get_or_insert_with(|| value.into_owned());
        }
        "limit" => {
          limit.get_or_insert_with(|| value.into_owned());
        }
        "teams" => teams.push(value.into_owned()),
        "levels" => levels.push(value.into_owned()),
        "locations" => locations.push(value.into_owned()),
        _ => {}
      }
    }

    let query = query.unwrap_or_default();
    if query.trim().is_empty() {
      return Err(SearchError::invalid("query text `q` is required"));
    }

    let conversation_id = conversation_id
      .map(|id| id.trim().to_string())
      .filter(|id| !id.is_empty())
      .ok_or_else(|| SearchError::invalid("`chatId` is required"))?;

    let limit = match limit.as_deref().map(str::trim) {
      None | Some("") => None,
      Some(raw) => Some(
        raw
          .parse::<usize>()
          .map_err(|_| SearchError::invalid(format!("`limit` must be a non-negative integer, got {raw:?}")))?,
      ),
    };

    Ok(Self {
      filters: SearchFilterSet::new(&query, teams, levels, locations, limit),
      conversation_id,
    })
  }
}

/// Profile id and similarity score from the vector engine
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
  pub profile_id: String,
  pub score: f32,
}

/// The unit streamed to the caller and recorded in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnrichedResult {
  pub score: f32,
  pub profile: Profile,
  pub explanation: String,
}

impl EnrichedResult {
  /// Assistant message body stored in the transcript
  pub fn transcript_content(&self) -> serde_json::Value {
    serde_json::json!({
      "score": self.score,
      "profileId": self.profile.id,
      "name": self.profile.name,
      "explanation": self.explanation,
    })
  }
}
