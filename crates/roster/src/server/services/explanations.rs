//! Natural-language explanations of why a candidate matches a query
//!
//! Explanations come from an OpenAI-compatible chat completion endpoint. They
//! are best effort: callers substitute [`FALLBACK_EXPLANATION`] on any failure.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::server::models::profile::{Organization, Profile};

/// Shown in place of an explanation that could not be generated
pub const FALLBACK_EXPLANATION: &str = "Failed to generate reasoning";

const SYSTEM_PROMPT: &str =
  "You are a helpful assistant giving analytical reasoning about how well a person fits a request.";

/// Everything the model sees about one candidate
#[derive(Debug, Clone)]
pub struct ExplanationRequest<'a> {
  pub query: &'a str,
  pub organization: &'a Organization,
  pub profile: &'a Profile,
}

impl ExplanationRequest<'_> {
  pub fn prompt(&self) -> String {
    let org = self.organization;
    let profile = self.profile;
    let team = org.team_name(profile.team.as_deref()).unwrap_or_default();
    let level = org.level_name(profile.level.as_deref()).unwrap_or_default();
    let location = org.location_name(profile.location.as_deref()).unwrap_or_default();

    format!(
      "You are an experienced recruiter reviewing members of the organization \"{title}\".\n\
       Given the search request and the member profile below, explain whether and why this \
       member fits the request.\n\n\
       Request:\n{query}\n\n\
       Member:\n\
       Name: {name}\n\
       Description: {description}\n\
       Team: {team}\n\
       Level: {level}\n\
       Location: {location}\n\n\
       Answer in concise, analytical English. Give reasoning rather than a summary.",
      title = org.title,
      query = self.query,
      name = profile.name,
      description = profile.description,
    )
  }
}

#[async_trait]
pub trait ExplanationService: Send + Sync {
  async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
  #[serde(default)]
  content: Option<String>,
}

/// Chat-completions client
pub struct OpenAiExplanationService {
  http: reqwest::Client,
  endpoint: String,
  api_key: Option<String>,
  model: String,
}

impl OpenAiExplanationService {
  /// `timeout` bounds the HTTP exchange; the orchestrator applies its own deadline too
  pub fn new(base_url: &str, api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build explanation HTTP client")?;
    Ok(Self {
      http,
      endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
      api_key: api_key.filter(|k| !k.trim().is_empty()),
      model: model.to_string(),
    })
  }
}

#[async_trait]
impl ExplanationService for OpenAiExplanationService {
  async fn explain(&self, request: &ExplanationRequest<'_>) -> Result<String> {
    let api_key = self.api_key.as_deref().ok_or_else(|| anyhow!("No language model API key configured"))?;
    let prompt = request.prompt();
    let body = ChatRequest {
      model: &self.model,
      messages: vec![
        ChatMessage { role: "system", content: SYSTEM_PROMPT },
        ChatMessage { role: "user", content: &prompt },
      ],
    };

    let response = self
      .http
      .post(&self.endpoint)
      .bearer_auth(api_key)
      .json(&body)
      .send()
      .await
      .context("Chat completion request failed")?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(anyhow!("Chat completion returned {status}: {text}"));
    }

    let parsed: ChatResponse = response.json().await.context("Malformed chat completion response")?;
    parsed
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .ok_or_else(|| anyhow!("No response from model"))
  }
}
