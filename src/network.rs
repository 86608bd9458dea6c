//! Online/offline status shared between the context and its consumers.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared network status flag.
///
/// Clones observe and update the same flag. Interested parties can
/// [`subscribe`](NetworkStatus::subscribe) to be woken on every change.
#[derive(Clone, Debug)]
pub struct NetworkStatus {
  tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record a connectivity change. Repeating the current value is a no-op.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    });

    if changed {
      if online {
        tracing::info!("Network back online");
      } else {
        tracing::warn!("Network offline");
      }
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for NetworkStatus {
  fn default() -> Self {
    Self::new(true)
  }
}
