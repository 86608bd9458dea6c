//! Retry policy shared by the request executor and the fetch hook.

use std::time::Duration;

use crate::error::ApiError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
  /// Wait for the given delay, then try again
  Retry(Duration),
  /// Surface the error to the caller
  GiveUp,
}

/// Exponential backoff over the error taxonomy.
///
/// Permanent failures are never retried. Transient ones are retried up to
/// `max_retries` times, waiting `base_delay * 2^attempt` (capped at
/// `max_delay`) before each new attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(60),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_retries: u32) -> Self {
    Self {
      max_retries,
      ..Self::default()
    }
  }

  /// A policy that never retries.
  pub fn none() -> Self {
    Self::new(0)
  }

  pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
    self.base_delay = base_delay;
    self
  }

  /// Decide whether to retry after `attempt` (0-based) failed with `error`.
  pub fn decide(&self, error: &ApiError, attempt: u32) -> RetryDecision {
    if !error.kind().is_retryable() || attempt >= self.max_retries {
      return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(self.delay_for(attempt))
  }

  /// Backoff before the retry that follows `attempt`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self
      .base_delay
      .checked_mul(factor)
      .unwrap_or(self.max_delay)
      .min(self.max_delay)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  fn error(kind: ErrorKind) -> ApiError {
    ApiError::new(kind, 0, "boom")
  }

  #[test]
  fn test_permanent_errors_give_up_immediately() {
    let policy = RetryPolicy::new(5);
    for kind in [
      ErrorKind::Validation,
      ErrorKind::Authentication,
      ErrorKind::Authorization,
      ErrorKind::NotFound,
    ] {
      assert_eq!(policy.decide(&error(kind), 0), RetryDecision::GiveUp);
    }
  }

  #[test]
  fn test_transient_errors_retry_until_exhausted() {
    let policy = RetryPolicy::new(2);
    let err = error(ErrorKind::Server);

    assert_eq!(
      policy.decide(&err, 0),
      RetryDecision::Retry(Duration::from_secs(1))
    );
    assert_eq!(
      policy.decide(&err, 1),
      RetryDecision::Retry(Duration::from_secs(2))
    );
    assert_eq!(policy.decide(&err, 2), RetryDecision::GiveUp);
  }

  #[test]
  fn test_backoff_is_non_decreasing_and_capped() {
    let policy = RetryPolicy {
      max_retries: 40,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
    };

    let delays: Vec<Duration> = (0..40).map(|a| policy.delay_for(a)).collect();
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(delays[3], Duration::from_secs(8));
    assert_eq!(*delays.last().unwrap(), Duration::from_secs(30));
  }

  #[test]
  fn test_none_never_retries() {
    let policy = RetryPolicy::none();
    assert_eq!(
      policy.decide(&error(ErrorKind::Network), 0),
      RetryDecision::GiveUp
    );
  }
}
