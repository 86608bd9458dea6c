//! Async query abstraction for data fetching with caching support.
//!
//! Inspired by TanStack Query, a `Query<T>` wraps an async operation and
//! tracks its data, loading flag and error. On `execute()` it:
//!
//! 1. Cancels whatever this query still had in flight
//! 2. Serves a live cache entry if a cache key is set
//! 3. Fails fast with a network error when the context is offline
//! 4. Otherwise runs the operation on a task, retrying transient failures
//!
//! # Example
//!
//! ```ignore
//! let api = api.clone();
//! let mut query = Query::new(
//!     ctx.clone(),
//!     QueryOptions::default().cache_key("volunteers"),
//!     move || {
//!         let api = api.clone();
//!         async move { api.volunteers().await }
//!     },
//! );
//!
//! query.execute();
//!
//! // In an event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//!
//! // Or just wait for it
//! query.settle().await;
//! ```

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::context::AppContext;
use crate::error::{ApiError, ErrorKind, NO_STATUS};
use crate::retry::{RetryDecision, RetryPolicy};

/// Where the current data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
  Network,
  Cache,
}

/// Observable state of one query.
#[derive(Debug, Clone)]
pub struct RequestState<T> {
  pub data: Option<T>,
  pub loading: bool,
  pub error: Option<ApiError>,
  pub last_fetched_at: Option<DateTime<Utc>>,
  pub source: Option<DataSource>,
}

impl<T> Default for RequestState<T> {
  fn default() -> Self {
    Self {
      data: None,
      loading: false,
      error: None,
      last_fetched_at: None,
      source: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
  /// Cache results under this key; `None` disables caching
  pub cache_key: Option<String>,
  /// Lifetime of cached results (defaults to the cache's own TTL)
  pub cache_ttl: Option<Duration>,
  /// Retries after the first attempt for transient failures
  pub retries: u32,
  /// Execute as soon as the query is created
  pub auto_fetch: bool,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      cache_key: None,
      cache_ttl: None,
      retries: 3,
      auto_fetch: false,
    }
  }
}

impl QueryOptions {
  pub fn cache_key(mut self, key: impl Into<String>) -> Self {
    self.cache_key = Some(key.into());
    self
  }

  pub fn cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = Some(ttl);
    self
  }

  pub fn retries(mut self, retries: u32) -> Self {
    self.retries = retries;
    self
  }

  pub fn auto_fetch(mut self, auto_fetch: bool) -> Self {
    self.auto_fetch = auto_fetch;
    self
  }
}

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Async query with cache, offline and retry handling.
///
/// A query owns at most one in-flight call. Starting another call, calling
/// `reset()`, or dropping the query aborts it, and an aborted call never
/// touches the state.
pub struct Query<T> {
  state: RequestState<T>,
  fetcher: FetcherFn<T>,
  options: QueryOptions,
  context: AppContext,
  receiver: Option<oneshot::Receiver<Result<T, ApiError>>>,
  task: Option<JoinHandle<()>>,
}

impl<T> Query<T>
where
  T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
  /// Create a query around `fetcher`, which is called once per attempt.
  ///
  /// With `auto_fetch` set this executes immediately, so it must then be
  /// called inside a tokio runtime.
  pub fn new<F, Fut>(context: AppContext, options: QueryOptions, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let fetcher: FetcherFn<T> =
      Arc::new(move || -> BoxFuture<'static, Result<T, ApiError>> { Box::pin(fetcher()) });
    let mut query = Self {
      state: RequestState::default(),
      fetcher,
      options,
      context,
      receiver: None,
      task: None,
    };
    if query.options.auto_fetch {
      query.execute();
    }
    query
  }

  pub fn state(&self) -> &RequestState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.state.loading
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error.as_ref()
  }

  pub fn options(&self) -> &QueryOptions {
    &self.options
  }

  /// Start a call, cancelling any call still in flight.
  pub fn execute(&mut self) {
    self.cancel();

    if let Some(key) = &self.options.cache_key {
      if let Some(data) = self.context.cache().get_as::<T>(key) {
        tracing::debug!(key = %key, "Serving query from cache");
        self.state.data = Some(data);
        self.state.loading = false;
        self.state.error = None;
        self.state.source = Some(DataSource::Cache);
        self.context.set_error(key, None);
        return;
      }
    }

    if !self.context.is_online() {
      self.fail(ApiError::offline());
      return;
    }

    self.state.loading = true;
    self.state.error = None;
    if let Some(key) = &self.options.cache_key {
      self.context.begin_loading(key);
    }

    let (tx, rx) = oneshot::channel();
    let fetcher = Arc::clone(&self.fetcher);
    let policy = RetryPolicy::new(self.options.retries);
    let label = self.options.cache_key.clone().unwrap_or_default();

    self.receiver = Some(rx);
    self.task = Some(tokio::spawn(async move {
      let result = run_with_retry(fetcher, policy, &label).await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    }));
  }

  /// Drop the cached entry for this query's key, then execute.
  pub fn refresh(&mut self) {
    if let Some(key) = &self.options.cache_key {
      self.context.cache().clear(Some(key));
    }
    self.execute();
  }

  /// Cancel any in-flight call and return to the idle state.
  pub fn reset(&mut self) {
    self.cancel();
    self.state = RequestState::default();
    if let Some(key) = &self.options.cache_key {
      self.context.set_error(key, None);
    }
  }

  /// Poll for results from a pending call.
  ///
  /// Returns `true` if the state changed (data arrived or an error occurred).
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.finish(result);
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.finish(Err(cancelled()));
        true
      }
    }
  }

  /// Wait for the in-flight call (if any) to finish and return the state.
  pub async fn settle(&mut self) -> &RequestState<T> {
    if let Some(receiver) = self.receiver.as_mut() {
      let result = receiver.await.unwrap_or_else(|_| Err(cancelled()));
      self.finish(result);
    }
    &self.state
  }

  fn finish(&mut self, result: Result<T, ApiError>) {
    self.receiver = None;
    self.task = None;

    match result {
      Ok(data) => {
        if let Some(key) = &self.options.cache_key {
          let ttl = self
            .options
            .cache_ttl
            .unwrap_or_else(|| self.context.cache().default_ttl());
          if let Err(e) = self.context.cache().set_as(key, &data, ttl) {
            tracing::warn!(key = %key, "Could not cache query result: {}", e);
          }
          self.context.set_error(key, None);
        }
        self.release_loading();
        self.state.data = Some(data);
        self.state.error = None;
        self.state.last_fetched_at = Some(Utc::now());
        self.state.source = Some(DataSource::Network);
      }
      Err(error) => self.fail(error),
    }
  }

  fn fail(&mut self, error: ApiError) {
    tracing::debug!(kind = %error.kind(), "Query failed: {}", error);
    if let Some(key) = &self.options.cache_key {
      self.context.set_error(key, Some(error.clone()));
    }
    self.release_loading();
    self.context.notifier().raise_for(&error);
    self.state.error = Some(error);
  }

  fn cancel(&mut self) {
    self.receiver = None;
    if let Some(task) = self.task.take() {
      task.abort();
      self.release_loading();
    }
  }
}

impl<T> Query<T> {
  /// End this query's share of the context loading flag, once per load.
  fn release_loading(&mut self) {
    if !self.state.loading {
      return;
    }
    self.state.loading = false;
    if let Some(key) = &self.options.cache_key {
      self.context.end_loading(key);
    }
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
      self.release_loading();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

fn cancelled() -> ApiError {
  ApiError::new(ErrorKind::Unknown, NO_STATUS, "Query was cancelled")
}

async fn run_with_retry<T>(
  fetcher: FetcherFn<T>,
  policy: RetryPolicy,
  label: &str,
) -> Result<T, ApiError> {
  let mut attempt = 0;
  loop {
    let error = match fetcher().await {
      Ok(data) => return Ok(data),
      Err(error) => error,
    };

    match policy.decide(&error, attempt) {
      RetryDecision::Retry(delay) => {
        tracing::warn!(
          query = label,
          kind = %error.kind(),
          attempt,
          "Query attempt failed, retrying in {:?}: {}",
          delay,
          error
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      RetryDecision::GiveUp => return Err(error),
    }
  }
}
