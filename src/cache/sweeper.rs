//! Background task that periodically drops expired cache entries.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ttl::TtlCache;

/// Handle to a running sweep task. Dropping it stops the task.
pub struct Sweeper {
  handle: JoinHandle<()>,
}

impl Sweeper {
  /// Start sweeping `cache` every `interval`.
  ///
  /// The task only holds a weak reference, so it also ends on its own once
  /// the cache is gone.
  pub fn spawn(cache: &Arc<TtlCache>, interval: Duration) -> Self {
    let cache: Weak<TtlCache> = Arc::downgrade(cache);

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // The first tick completes immediately
      ticker.tick().await;

      loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else {
          break;
        };
        let removed = cache.sweep();
        if removed > 0 {
          tracing::debug!(removed, remaining = cache.len(), "Swept expired cache entries");
        }
      }
    });

    Self { handle }
  }

  pub fn is_running(&self) -> bool {
    !self.handle.is_finished()
  }

  pub fn stop(self) {
    // Drop aborts
  }
}

impl Drop for Sweeper {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::num::NonZeroUsize;

  fn cache() -> Arc<TtlCache> {
    Arc::new(TtlCache::new(
      NonZeroUsize::new(16).unwrap(),
      Duration::from_secs(60),
    ))
  }

  #[tokio::test(start_paused = true)]
  async fn test_sweeps_on_interval() {
    let cache = cache();
    cache.set("a", json!(1), Duration::from_secs(5));
    cache.set("b", json!(2), Duration::from_secs(500));

    let _sweeper = Sweeper::spawn(&cache, Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(cache.len(), 2);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stop_halts_sweeping() {
    let cache = cache();
    cache.set("a", json!(1), Duration::from_secs(5));

    let sweeper = Sweeper::spawn(&cache, Duration::from_secs(60));
    assert!(sweeper.is_running());
    sweeper.stop();

    tokio::time::sleep(Duration::from_secs(120)).await;
    // Expired but never swept
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ends_when_cache_dropped() {
    let cache = cache();
    let sweeper = Sweeper::spawn(&cache, Duration::from_secs(1));
    drop(cache);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!sweeper.is_running());
  }
}
