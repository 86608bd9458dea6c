//! The wire seam under the request executor.
//!
//! [`ApiClient`](crate::client::ApiClient) only needs to send a request and
//! read back a status and a body. Keeping that behind [`Transport`] lets the
//! executor's timeout and retry logic run against scripted responses.

use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A fully built request, ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<String>,
}

impl HttpRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Raw response: status plus body text. Interpretation happens in the client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<String>) -> Self {
    Self {
      status,
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Sends one request. Implementations must not retry or time out on their
/// own; the executor owns both.
pub trait Transport: Send + Sync {
  fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, ApiError>>;
}

/// Production transport backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("giveback/", env!("CARGO_PKG_VERSION")))
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

impl Transport for ReqwestTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, ApiError>> {
    let client = self.client.clone();

    Box::pin(async move {
      let mut builder = client.request(request.method.into(), &request.url);
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| ApiError::network(format!("Network error: {}", e)))?;

      let status = response.status().as_u16();
      let body = response
        .text()
        .await
        .map_err(|e| ApiError::network(format!("Failed to read response body: {}", e)))?;

      Ok(HttpResponse { status, body })
    })
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted transport for executor and API tests.

  use super::*;
  use parking_lot::Mutex;
  use std::collections::VecDeque;
  use std::sync::Arc;
  use tokio::time::Instant;

  /// One scripted reply.
  #[derive(Debug, Clone)]
  pub enum Reply {
    Respond(HttpResponse),
    Fail(ApiError),
    /// Never completes
    Hang,
  }

  impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
      Reply::Respond(HttpResponse::new(status, body.to_string()))
    }
  }

  /// Replays a fixed script and records every request it saw. Once the
  /// script runs out the last reply repeats.
  #[derive(Clone, Default)]
  pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    last: Arc<Mutex<Option<Reply>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    sent_at: Arc<Mutex<Vec<Instant>>>,
  }

  impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
      Self {
        replies: Arc::new(Mutex::new(replies.into_iter().collect())),
        ..Self::default()
      }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
      self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
      self.requests.lock().len()
    }

    /// Gaps between consecutive requests, on the tokio clock.
    pub fn gaps(&self) -> Vec<Duration> {
      self
        .sent_at
        .lock()
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect()
    }
  }

  impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, ApiError>> {
      self.requests.lock().push(request);
      self.sent_at.lock().push(Instant::now());

      let reply = {
        let mut replies = self.replies.lock();
        let mut last = self.last.lock();
        match replies.pop_front() {
          Some(reply) => {
            *last = Some(reply.clone());
            reply
          }
          None => last
            .clone()
            .unwrap_or_else(|| Reply::Fail(ApiError::network("script exhausted"))),
        }
      };

      Box::pin(async move {
        match reply {
          Reply::Respond(response) => Ok(response),
          Reply::Fail(error) => Err(error),
          Reply::Hang => futures::future::pending().await,
        }
      })
    }
  }
}
