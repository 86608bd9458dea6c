//! Transient user-facing notifications.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{ApiError, ErrorKind};

/// How many notifications are kept for [`Notifier::recent`].
const RECENT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub kind: ErrorKind,
  pub message: String,
  pub raised_at: DateTime<Utc>,
}

/// Collects notifications and fans them out to subscribers.
#[derive(Clone)]
pub struct Notifier {
  recent: Arc<Mutex<VecDeque<Notification>>>,
  tx: broadcast::Sender<Notification>,
}

impl Notifier {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(RECENT_LIMIT);
    Self {
      recent: Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_LIMIT))),
      tx,
    }
  }

  pub fn raise(&self, kind: ErrorKind, message: impl Into<String>) {
    let notification = Notification {
      kind,
      message: message.into(),
      raised_at: Utc::now(),
    };
    tracing::info!(kind = %kind, "Notification: {}", notification.message);

    {
      let mut recent = self.recent.lock();
      if recent.len() == RECENT_LIMIT {
        recent.pop_front();
      }
      recent.push_back(notification.clone());
    }

    // No subscribers is fine
    let _ = self.tx.send(notification);
  }

  /// Raise a notification for a terminal error if its kind warrants one.
  pub fn raise_for(&self, error: &ApiError) -> bool {
    if !error.kind().should_notify() {
      return false;
    }
    let message = match error.kind() {
      ErrorKind::Network => format!("Network problem: {}", error.message()),
      _ => format!("Server error: {}", error.message()),
    };
    self.raise(error.kind(), message);
    true
  }

  pub fn recent(&self) -> Vec<Notification> {
    self.recent.lock().iter().cloned().collect()
  }

  pub fn dismiss_all(&self) {
    self.recent.lock().clear();
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
    self.tx.subscribe()
  }
}

impl Default for Notifier {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_only_network_and_server_notify() {
    let notifier = Notifier::new();

    assert!(notifier.raise_for(&ApiError::network("down")));
    assert!(notifier.raise_for(&ApiError::from_response(500, None)));
    assert!(!notifier.raise_for(&ApiError::from_response(400, None)));
    assert!(!notifier.raise_for(&ApiError::timeout(10)));

    let kinds: Vec<ErrorKind> = notifier.recent().iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::Network, ErrorKind::Server]);
  }

  #[test]
  fn test_recent_is_bounded() {
    let notifier = Notifier::new();
    for i in 0..(RECENT_LIMIT + 5) {
      notifier.raise(ErrorKind::Server, format!("n{}", i));
    }

    let recent = notifier.recent();
    assert_eq!(recent.len(), RECENT_LIMIT);
    assert_eq!(recent[0].message, "n5");

    notifier.dismiss_all();
    assert!(notifier.recent().is_empty());
  }

  #[tokio::test]
  async fn test_subscribers_receive() {
    let notifier = Notifier::new();
    let mut rx = notifier.subscribe();

    notifier.raise(ErrorKind::Network, "offline");
    let received = rx.recv().await.unwrap();
    assert_eq!(received.message, "offline");
  }
}
