//! In-memory TTL cache with an LRU capacity bound.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value and when it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub value: Value,
  pub stored_at: Instant,
  pub ttl: Duration,
}

impl CacheEntry {
  /// Valid iff `now - stored_at < ttl`.
  pub fn is_expired(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.stored_at) >= self.ttl
  }
}

/// Key/value cache where every entry carries its own time-to-live.
///
/// Expired entries read as absent and are evicted on read; [`TtlCache::sweep`]
/// removes the rest. Once `capacity` entries are held, inserting a new key
/// evicts the least recently used one.
pub struct TtlCache {
  entries: Mutex<LruCache<String, CacheEntry>>,
  default_ttl: Duration,
}

impl TtlCache {
  pub fn new(capacity: NonZeroUsize, default_ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(LruCache::new(capacity)),
      default_ttl,
    }
  }

  pub fn default_ttl(&self) -> Duration {
    self.default_ttl
  }

  /// Store `value` under `key` for `ttl`.
  pub fn set(&self, key: &str, value: Value, ttl: Duration) {
    let entry = CacheEntry {
      value,
      stored_at: Instant::now(),
      ttl,
    };
    if let Some((evicted, _)) = self.entries.lock().push(key.to_string(), entry) {
      if evicted != key {
        tracing::debug!(key = %evicted, "Evicted least recently used cache entry");
      }
    }
  }

  /// Serialize and store a typed value.
  pub fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> serde_json::Result<()> {
    let value = serde_json::to_value(value)?;
    self.set(key, value, ttl);
    Ok(())
  }

  /// Get a live value. Expired entries are evicted and read as `None`.
  pub fn get(&self, key: &str) -> Option<Value> {
    let mut entries = self.entries.lock();

    let expired = entries.peek(key)?.is_expired(Instant::now());
    if expired {
      entries.pop(key);
      return None;
    }

    entries.get(key).map(|entry| entry.value.clone())
  }

  /// Get a live value and deserialize it. A value of the wrong shape reads
  /// as `None`.
  pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let value = self.get(key)?;
    match serde_json::from_value(value) {
      Ok(typed) => Some(typed),
      Err(e) => {
        tracing::debug!(key, "Cached value has unexpected shape: {}", e);
        None
      }
    }
  }

  /// Remove one key, or everything when `key` is `None`.
  pub fn clear(&self, key: Option<&str>) {
    let mut entries = self.entries.lock();
    match key {
      Some(key) => {
        entries.pop(key);
      }
      None => entries.clear(),
    }
  }

  /// Remove every expired entry. Returns how many were removed.
  pub fn sweep(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries.lock();

    let expired: Vec<String> = entries
      .iter()
      .filter(|(_, entry)| entry.is_expired(now))
      .map(|(key, _)| key.clone())
      .collect();

    for key in &expired {
      entries.pop(key);
    }
    expired.len()
  }

  /// Number of held entries, expired ones included until swept.
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
