//! Error taxonomy for API calls.
//!
//! Every failure surfaced by the request executor is an [`ApiError`] tagged
//! with an [`ErrorKind`]. The kind drives retry decisions and what the user
//! gets to see (inline form errors, auth prompts, or a transient notification).

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Status used for failures that never produced an HTTP response.
pub const NO_STATUS: u16 = 0;

/// Status attached to timed-out attempts.
pub const TIMEOUT_STATUS: u16 = 408;

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
  /// Transport failure, no response received (or the client is offline)
  Network,
  /// The attempt did not finish before the timeout
  Timeout,
  /// 400: the server rejected the input
  Validation,
  /// 401: missing or expired credentials
  Authentication,
  /// 403: authenticated but not allowed
  Authorization,
  /// 404
  NotFound,
  /// 5xx
  Server,
  /// Any other failing status, or an unreadable response
  Unknown,
}

impl ErrorKind {
  /// Map a failing HTTP status to its kind.
  pub fn from_status(status: u16) -> Self {
    match status {
      400 => ErrorKind::Validation,
      401 => ErrorKind::Authentication,
      403 => ErrorKind::Authorization,
      404 => ErrorKind::NotFound,
      408 => ErrorKind::Timeout,
      500..=599 => ErrorKind::Server,
      _ => ErrorKind::Unknown,
    }
  }

  /// Permanent failures come from client input or credentials and will not
  /// change by asking again.
  pub fn is_permanent(self) -> bool {
    matches!(
      self,
      ErrorKind::Validation
        | ErrorKind::Authentication
        | ErrorKind::Authorization
        | ErrorKind::NotFound
    )
  }

  pub fn is_retryable(self) -> bool {
    !self.is_permanent()
  }

  /// Whether a failure of this kind should raise a transient notification.
  pub fn should_notify(self) -> bool {
    matches!(self, ErrorKind::Network | ErrorKind::Server)
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Network => "network",
      ErrorKind::Timeout => "timeout",
      ErrorKind::Validation => "validation",
      ErrorKind::Authentication => "authentication",
      ErrorKind::Authorization => "authorization",
      ErrorKind::NotFound => "not found",
      ErrorKind::Server => "server",
      ErrorKind::Unknown => "unknown",
    };
    f.write_str(name)
  }
}

/// A classified request failure. Immutable once created.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
  message: String,
  kind: ErrorKind,
  status: u16,
  payload: Option<Value>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, status: u16, message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      kind,
      status,
      payload: None,
    }
  }

  /// Build an error from a failing HTTP response.
  ///
  /// The message is taken from the payload's `message` field when the server
  /// sent one.
  pub fn from_response(status: u16, payload: Option<Value>) -> Self {
    let message = payload
      .as_ref()
      .and_then(|p| p.get("message"))
      .and_then(Value::as_str)
      .map(String::from)
      .unwrap_or_else(|| format!("Request failed with status {}", status));

    Self {
      message,
      kind: ErrorKind::from_status(status),
      status,
      payload,
    }
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Network, NO_STATUS, message)
  }

  pub fn offline() -> Self {
    Self::network("No network connection")
  }

  pub fn timeout(after_ms: u128) -> Self {
    Self::new(
      ErrorKind::Timeout,
      TIMEOUT_STATUS,
      format!("Request timed out after {}ms", after_ms),
    )
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn kind(&self) -> ErrorKind {
    self.kind
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  pub fn payload(&self) -> Option<&Value> {
    self.payload.as_ref()
  }

  /// Field-level validation messages, if the server sent an `errors` array
  /// of `{ field, message }` objects.
  pub fn field_errors(&self) -> Vec<(String, String)> {
    let Some(errors) = self
      .payload
      .as_ref()
      .and_then(|p| p.get("errors"))
      .and_then(Value::as_array)
    else {
      return Vec::new();
    };

    errors
      .iter()
      .filter_map(|e| {
        let field = e
          .get("field")
          .or_else(|| e.get("param"))
          .or_else(|| e.get("path"))
          .and_then(Value::as_str)?;
        let message = e.get("message").or_else(|| e.get("msg")).and_then(Value::as_str)?;
        Some((field.to_string(), message.to_string()))
      })
      .collect()
  }
}
