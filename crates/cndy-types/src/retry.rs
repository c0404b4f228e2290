use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};

/// Bounded retry with exponential backoff, shared by uploads and ledger
/// submissions.
///
/// `max_attempts` counts the first try, so `1` means "never retry".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_interval_ms: 500,
            max_interval_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval_ms: initial.as_millis() as u64,
            max_interval_ms: max.as_millis() as u64,
        }
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval_ms: 0,
            max_interval_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// A fresh backoff schedule. Elapsed-time cutoff is disabled; the
    /// attempt count is the only bound.
    pub fn backoff(&self) -> RetryBackoff {
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build();
        RetryBackoff {
            inner,
            zero: self.initial_interval_ms == 0,
        }
    }
}

/// Delay schedule produced by [`RetryPolicy::backoff`].
#[derive(Debug)]
pub struct RetryBackoff {
    inner: ExponentialBackoff,
    zero: bool,
}

impl RetryBackoff {
    pub fn next_delay(&mut self) -> Duration {
        if self.zero {
            return Duration::ZERO;
        }
        self.inner.next_backoff().unwrap_or(self.inner.max_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_never_zero() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
        assert_eq!(RetryPolicy::default().attempts(), 4);
    }

    #[test]
    fn immediate_policy_does_not_wait() {
        let mut b = RetryPolicy::immediate(3).backoff();
        assert_eq!(b.next_delay(), Duration::ZERO);
        assert_eq!(b.next_delay(), Duration::ZERO);
    }

    #[test]
    fn delays_stay_under_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(400));
        let mut b = policy.backoff();
        for _ in 0..10 {
            // Randomization can push a single delay up to 1.5x the interval.
            assert!(b.next_delay() <= Duration::from_millis(600));
        }
    }

    #[test]
    fn deserializes_partial_config() {
        let p: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 7}"#).unwrap();
        assert_eq!(p.max_attempts, 7);
        assert_eq!(p.initial_interval_ms, 500);
    }
}
