//! Request executor: headers, auth, per-attempt timeout, error
//! classification and retry.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{ApiError, ErrorKind, NO_STATUS};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::storage::Session;
use crate::transport::{HttpRequest, Method, ReqwestTransport, Transport};

/// Per-call overrides of the client defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
  pub timeout: Option<Duration>,
  pub max_retries: Option<u32>,
}

impl RequestOptions {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = Some(max_retries);
    self
  }
}

/// JSON API client.
///
/// Cloning is cheap; clones share the transport and the persisted session.
#[derive(Clone)]
pub struct ApiClient {
  transport: Arc<dyn Transport>,
  session: Session,
  base_url: String,
  timeout: Duration,
  retry: RetryPolicy,
}

impl ApiClient {
  /// Create a client that talks HTTP through reqwest.
  pub fn new(config: &ApiConfig, session: Session) -> Result<Self, ApiError> {
    let transport = ReqwestTransport::new()?;
    Ok(Self::with_transport(Arc::new(transport), config, session))
  }

  pub fn with_transport(
    transport: Arc<dyn Transport>,
    config: &ApiConfig,
    session: Session,
  ) -> Self {
    Self {
      transport,
      session,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      timeout: config.timeout(),
      retry: RetryPolicy::new(config.max_retries),
    }
  }

  /// Replace the retry policy, including its `max_retries`.
  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Resolve `path` against the base URL. Absolute URLs pass through.
  pub fn url_for(&self, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
      return path.to_string();
    }
    format!("{}/{}", self.base_url, path.trim_start_matches('/'))
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let value = self
      .request(Method::Get, path, None, RequestOptions::default())
      .await?;
    decode(value)
  }

  pub async fn post<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.send_json(Method::Post, path, body).await
  }

  pub async fn put<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.send_json(Method::Put, path, body).await
  }

  pub async fn patch<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.send_json(Method::Patch, path, body).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let value = self
      .request(Method::Delete, path, None, RequestOptions::default())
      .await?;
    decode(value)
  }

  async fn send_json<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    let body = serde_json::to_value(body).map_err(|e| {
      ApiError::new(
        ErrorKind::Unknown,
        NO_STATUS,
        format!("Failed to serialize request body: {}", e),
      )
    })?;
    let value = self
      .request(method, path, Some(body), RequestOptions::default())
      .await?;
    decode(value)
  }

  /// Send a request and return the parsed JSON body.
  ///
  /// Transient failures are retried with exponential backoff; permanent ones
  /// are returned after the first attempt.
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    body: Option<Value>,
    options: RequestOptions,
  ) -> Result<Value, ApiError> {
    let request = self.build_request(method, path, body)?;
    let timeout = options.timeout.unwrap_or(self.timeout);
    let policy = RetryPolicy {
      max_retries: options.max_retries.unwrap_or(self.retry.max_retries),
      ..self.retry
    };

    let mut attempt = 0;
    loop {
      debug!(method = %request.method, url = %request.url, attempt, "Sending request");

      let error = match self.attempt(&request, timeout).await {
        Ok(value) => return Ok(value),
        Err(error) => error,
      };

      match policy.decide(&error, attempt) {
        RetryDecision::Retry(delay) => {
          warn!(
            method = %request.method,
            url = %request.url,
            kind = %error.kind(),
            status = error.status(),
            attempt,
            "Request failed, retrying in {:?}: {}",
            delay,
            error
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        RetryDecision::GiveUp => {
          debug!(
            method = %request.method,
            url = %request.url,
            kind = %error.kind(),
            status = error.status(),
            "Request failed: {}",
            error
          );
          return Err(error);
        }
      }
    }
  }

  fn build_request(
    &self,
    method: Method,
    path: &str,
    body: Option<Value>,
  ) -> Result<HttpRequest, ApiError> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

    let token = self.session.token().map_err(|e| {
      ApiError::new(
        ErrorKind::Unknown,
        NO_STATUS,
        format!("Failed to read stored token: {}", e),
      )
    })?;
    if let Some(token) = token {
      headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }

    // GET never carries a body; strings go out as-is, anything else as JSON
    let body = match (method, body) {
      (Method::Get, _) | (_, None) => None,
      (_, Some(Value::String(raw))) => Some(raw),
      (_, Some(value)) => Some(value.to_string()),
    };

    Ok(HttpRequest {
      method,
      url: self.url_for(path),
      headers,
      body,
    })
  }

  /// One attempt, raced against the timeout. Dropping the transport future
  /// on timeout aborts the in-flight call.
  async fn attempt(&self, request: &HttpRequest, timeout: Duration) -> Result<Value, ApiError> {
    let response = tokio::time::timeout(timeout, self.transport.send(request.clone()))
      .await
      .map_err(|_| ApiError::timeout(timeout.as_millis()))??;

    if !response.is_success() {
      let payload = serde_json::from_str(&response.body).ok();
      return Err(ApiError::from_response(response.status, payload));
    }

    if response.body.trim().is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_str(&response.body).map_err(|e| {
      ApiError::new(
        ErrorKind::Unknown,
        response.status,
        format!("Invalid JSON in response: {}", e),
      )
    })
  }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value).map_err(|e| {
    ApiError::new(
      ErrorKind::Unknown,
      NO_STATUS,
      format!("Unexpected response shape: {}", e),
    )
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::testing::{Reply, ScriptedTransport};
  use crate::transport::HttpResponse;
  use serde_json::json;

  fn client(transport: &ScriptedTransport, max_retries: u32) -> ApiClient {
    let config = ApiConfig {
      base_url: "http://api.test/api/".to_string(),
      timeout_ms: 1_000,
      max_retries,
    };
    ApiClient::with_transport(Arc::new(transport.clone()), &config, Session::in_memory())
  }

  struct BrokenStorage;

  impl crate::storage::Storage for BrokenStorage {
    fn get(&self, _key: &str) -> color_eyre::Result<Option<String>> {
      Err(color_eyre::eyre::eyre!("database is locked"))
    }

    fn set(&self, _key: &str, _value: &str) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("database is locked"))
    }

    fn remove(&self, _key: &str) -> color_eyre::Result<()> {
      Err(color_eyre::eyre::eyre!("database is locked"))
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_unreadable_token_fails_without_sending() {
    let transport = ScriptedTransport::new([Reply::json(200, json!({}))]);
    let config = ApiConfig {
      base_url: "http://api.test/api".to_string(),
      timeout_ms: 1_000,
      max_retries: 3,
    };
    let client = ApiClient::with_transport(
      Arc::new(transport.clone()),
      &config,
      Session::new(Arc::new(BrokenStorage)),
    );

    let err = client.get::<Value>("donations").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert_eq!(err.status(), 0);
    assert!(err.message().contains("database is locked"));
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_parses_json() {
    let transport = ScriptedTransport::new([Reply::json(200, json!({ "total": 3 }))]);
    let client = client(&transport, 3);

    let value: Value = client.get("/impact").await.unwrap();
    assert_eq!(value, json!({ "total": 3 }));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://api.test/api/impact");
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    assert_eq!(requests[0].header("authorization"), None);
    assert_eq!(requests[0].body, None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_bearer_token_attached_when_stored() {
    let transport = ScriptedTransport::new([Reply::json(200, json!({}))]);
    let client = client(&transport, 0);
    client.session().set_token("secret").unwrap();

    let _: Value = client.get("volunteers").await.unwrap();

    assert_eq!(
      transport.requests()[0].header("Authorization"),
      Some("Bearer secret")
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_body_serialization() {
    let transport = ScriptedTransport::new([Reply::json(201, json!({ "ok": true }))]);
    let client = client(&transport, 0);

    let _: Value = client
      .post("contact", &json!({ "name": "Ada" }))
      .await
      .unwrap();
    client
      .request(
        Method::Put,
        "raw",
        Some(Value::String("already encoded".to_string())),
        RequestOptions::default(),
      )
      .await
      .unwrap();
    client
      .request(
        Method::Get,
        "ignored",
        Some(json!({ "dropped": true })),
        RequestOptions::default(),
      )
      .await
      .unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].body.as_deref(), Some(r#"{"name":"Ada"}"#));
    assert_eq!(requests[1].body.as_deref(), Some("already encoded"));
    assert_eq!(requests[2].body, None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_not_found_is_never_retried() {
    let transport = ScriptedTransport::new([Reply::json(404, json!({ "message": "Nope" }))]);
    let client = client(&transport, 3);

    let err = client.get::<Value>("stories/9").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status(), 404);
    assert_eq!(err.message(), "Nope");
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_validation_error_keeps_payload() {
    let transport = ScriptedTransport::new([Reply::json(
      400,
      json!({ "message": "Validation failed" }),
    )]);
    let client = client(&transport, 3);

    let err = client
      .post::<_, Value>("volunteers", &json!({}))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.payload(), Some(&json!({ "message": "Validation failed" })));
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_server_error_retried_with_backoff() {
    let transport = ScriptedTransport::new([Reply::json(500, json!({}))]);
    let client = client(&transport, 3);

    let err = client.get::<Value>("donations").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(transport.calls(), 4);

    let gaps = transport.gaps();
    assert_eq!(gaps.len(), 3);
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
    assert!(gaps[0] >= Duration::from_secs(1));
    assert!(gaps[2] >= Duration::from_secs(4));
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_failures_then_success() {
    let transport = ScriptedTransport::new([
      Reply::Fail(ApiError::network("connection reset")),
      Reply::Fail(ApiError::network("connection reset")),
      Reply::json(200, json!([1, 2])),
    ]);
    let client = client(&transport, 2);

    let value: Vec<u32> = client.get("volunteers").await.unwrap();
    assert_eq!(value, vec![1, 2]);
    assert_eq!(transport.calls(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_classified() {
    let transport = ScriptedTransport::new([Reply::Hang]);
    let client = client(&transport, 0);

    let err = client
      .request(
        Method::Get,
        "slow",
        None,
        RequestOptions::default().timeout(Duration::from_millis(50)),
      )
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.status(), 408);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_is_retried_per_attempt() {
    let transport = ScriptedTransport::new([Reply::Hang, Reply::json(200, json!("late"))]);
    let client = client(&transport, 1);

    let value: String = client.get("slow").await.unwrap();
    assert_eq!(value, "late");
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_authentication_not_retried() {
    let transport = ScriptedTransport::new([Reply::json(401, json!({}))]);
    let client = client(&transport, 3);

    let err = client.get::<Value>("auth/me").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_empty_body_is_null() {
    let transport = ScriptedTransport::new([Reply::Respond(HttpResponse::new(204, ""))]);
    let client = client(&transport, 0);

    let value: Value = client.delete("stories/1").await.unwrap();
    assert_eq!(value, Value::Null);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalid_json_is_unknown() {
    let transport = ScriptedTransport::new([Reply::Respond(HttpResponse::new(200, "<html>"))]);
    let client = client(&transport, 0);

    let err = client.get::<Value>("impact").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert_eq!(err.status(), 200);
  }

  #[tokio::test(start_paused = true)]
  async fn test_per_call_retry_override() {
    let transport = ScriptedTransport::new([Reply::json(503, json!({}))]);
    let client = client(&transport, 5);

    client
      .request(
        Method::Get,
        "impact",
        None,
        RequestOptions::default().max_retries(1),
      )
      .await
      .unwrap_err();
    assert_eq!(transport.calls(), 2);
  }

  #[test]
  fn test_url_for() {
    let transport = ScriptedTransport::default();
    let client = client(&transport, 0);

    assert_eq!(client.url_for("impact"), "http://api.test/api/impact");
    assert_eq!(client.url_for("/about/team"), "http://api.test/api/about/team");
    assert_eq!(
      client.url_for("https://elsewhere.test/x"),
      "https://elsewhere.test/x"
    );
  }
}
