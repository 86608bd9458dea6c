//! Process-wide client state, constructed once and handed to consumers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Sweeper, TtlCache};
use crate::config::CacheConfig;
use crate::error::ApiError;
use crate::network::NetworkStatus;
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
  pub capacity: NonZeroUsize,
  pub default_ttl: Duration,
  pub sweep_interval: Duration,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self::from(&CacheConfig::default())
  }
}

impl From<&CacheConfig> for CacheSettings {
  fn from(config: &CacheConfig) -> Self {
    Self {
      capacity: NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN),
      default_ttl: config.ttl(),
      sweep_interval: config.sweep_interval(),
    }
  }
}

/// Shared state behind every query: response cache, network status,
/// notifications, and per-key loading/error flags.
///
/// Clones share the same state. The periodic cache sweep runs between
/// [`start`](AppContext::start) and [`shutdown`](AppContext::shutdown), and
/// stops by itself once the last clone is dropped.
#[derive(Clone)]
pub struct AppContext {
  inner: Arc<Inner>,
}

struct Inner {
  cache: Arc<TtlCache>,
  network: NetworkStatus,
  notifier: Notifier,
  // In-flight queries per key
  loading: Mutex<HashMap<String, usize>>,
  errors: Mutex<HashMap<String, ApiError>>,
  sweep_interval: Duration,
  sweeper: Mutex<Option<Sweeper>>,
}

impl AppContext {
  pub fn new(settings: CacheSettings, online: bool) -> Self {
    Self {
      inner: Arc::new(Inner {
        cache: Arc::new(TtlCache::new(settings.capacity, settings.default_ttl)),
        network: NetworkStatus::new(online),
        notifier: Notifier::new(),
        loading: Mutex::new(HashMap::new()),
        errors: Mutex::new(HashMap::new()),
        sweep_interval: settings.sweep_interval,
        sweeper: Mutex::new(None),
      }),
    }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new(CacheSettings::from(config), true)
  }

  /// Start the background cache sweep. Must be called inside a tokio
  /// runtime. Calling it again while running does nothing.
  pub fn start(&self) {
    let mut sweeper = self.inner.sweeper.lock();
    if sweeper.as_ref().is_some_and(Sweeper::is_running) {
      return;
    }
    tracing::debug!(interval = ?self.inner.sweep_interval, "Starting cache sweep");
    *sweeper = Some(Sweeper::spawn(&self.inner.cache, self.inner.sweep_interval));
  }

  /// Stop the background cache sweep.
  pub fn shutdown(&self) {
    if let Some(sweeper) = self.inner.sweeper.lock().take() {
      tracing::debug!("Stopping cache sweep");
      sweeper.stop();
    }
  }

  pub fn is_running(&self) -> bool {
    self
      .inner
      .sweeper
      .lock()
      .as_ref()
      .is_some_and(Sweeper::is_running)
  }

  pub fn cache(&self) -> &TtlCache {
    &self.inner.cache
  }

  pub fn network(&self) -> &NetworkStatus {
    &self.inner.network
  }

  pub fn is_online(&self) -> bool {
    self.inner.network.is_online()
  }

  pub fn notifier(&self) -> &Notifier {
    &self.inner.notifier
  }

  /// Mark one more in-flight load for `key`.
  pub fn begin_loading(&self, key: &str) {
    *self.inner.loading.lock().entry(key.to_string()).or_insert(0) += 1;
  }

  /// Mark one in-flight load for `key` as done. The key stays loading until
  /// every load that began has ended.
  pub fn end_loading(&self, key: &str) {
    let mut loading = self.inner.loading.lock();
    if let Some(count) = loading.get_mut(key) {
      *count -= 1;
      if *count == 0 {
        loading.remove(key);
      }
    }
  }

  pub fn is_loading(&self, key: &str) -> bool {
    self.inner.loading.lock().contains_key(key)
  }

  pub fn any_loading(&self) -> bool {
    !self.inner.loading.lock().is_empty()
  }

  pub fn set_error(&self, key: &str, error: Option<ApiError>) {
    let mut errors = self.inner.errors.lock();
    match error {
      Some(error) => {
        errors.insert(key.to_string(), error);
      }
      None => {
        errors.remove(key);
      }
    }
  }

  pub fn error(&self, key: &str) -> Option<ApiError> {
    self.inner.errors.lock().get(key).cloned()
  }

  pub fn clear_errors(&self) {
    self.inner.errors.lock().clear();
  }
}

impl Default for AppContext {
  fn default() -> Self {
    Self::new(CacheSettings::default(), true)
  }
}
