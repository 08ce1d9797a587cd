//! Request context and middleware for the roster REST API
//!
//! Every request gets a `RequestContext` carrying a request id and the shared
//! logger; start and completion are written to the persistent request log.

use std::sync::Arc;
use std::time::Instant;

use axum::{
  extract::{Request, State},
  http::{HeaderMap, Method, Uri},
  middleware::Next,
  response::Response,
};
use bentley::daemon_logs::{DaemonLogs, LogContext};
use bentley::Level;
use uuid::Uuid;

use crate::server::models::identity::USER_ID_HEADER;
use crate::server::startup::AppState;

/// Request context containing logger and request metadata
#[derive(Clone)]
pub struct RequestContext {
  pub request_id: Uuid,
  pub method: Method,
  pub uri: Uri,
  pub headers: HeaderMap,
  pub logger: Arc<DaemonLogs>,
}

impl RequestContext {
  pub fn new(method: Method, uri: Uri, headers: HeaderMap, logger: Arc<DaemonLogs>) -> Self {
    Self { request_id: Uuid::new_v4(), method, uri, headers, logger }
  }

  pub async fn log_info(&self, message: &str, component: &str) {
    self.log(Level::Info, message, component, None, None).await;
  }

  pub async fn log_success(&self, message: &str, component: &str) {
    self.log(Level::Success, message, component, None, None).await;
  }

  pub async fn log_warn(&self, message: &str, component: &str) {
    self.log(Level::Warn, message, component, None, None).await;
  }

  pub async fn log_error(&self, message: &str, component: &str) {
    self.log(Level::Error, message, component, None, None).await;
  }

  fn log_context(&self, status_code: Option<u16>, duration_ms: Option<f64>) -> LogContext {
    let header = |name: &str| self.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    LogContext {
      request_id: Some(self.request_id.to_string()),
      method: Some(self.method.to_string()),
      path: Some(self.uri.path().to_string()),
      user_agent: header("user-agent"),
      user_id: header(USER_ID_HEADER),
      duration_ms,
      status_code,
    }
  }

  async fn log(
    &self,
    level: Level,
    message: &str,
    component: &str,
    status_code: Option<u16>,
    duration_ms: Option<f64>,
  ) {
    let line = format!("[{}] {} {} - {message}", self.request_id, self.method, self.uri.path());
    self.logger.record(level, &line, component, Some(self.log_context(status_code, duration_ms))).await;
  }
}

/// Middleware to inject RequestContext into all requests
pub async fn request_context_middleware(
  State(state): State<AppState>,
  mut request: Request,
  next: Next,
) -> Response {
  let context = RequestContext::new(
    request.method().clone(),
    request.uri().clone(),
    request.headers().clone(),
    state.logger.clone(),
  );

  let start = Instant::now();
  context.log(Level::Verbose, "Request started", "http-request", None, None).await;
  request.extensions_mut().insert(context.clone());

  let response = next.run(request).await;

  let status = response.status();
  let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
  let level = if status.is_server_error() { Level::Error } else { Level::Info };
  context.log(level, "Request completed", "http-request", Some(status.as_u16()), Some(duration_ms)).await;

  response
}
