//! Retry and backoff policy for recoverable failures.
//!
//! Applies to transport failures (network errors, timeouts) and to
//! `type="error"` responses. Terminal conditions never retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry/backoff configuration.
///
/// Defaults to three delivery attempts per request with a doubling delay
/// starting at 250 ms and capped at 5 s.
///
/// # Example
///
/// ```rust
/// use bosh::protocol::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig::default()
///     .with_max_attempts(5)
///     .with_initial_backoff(Duration::from_millis(100));
///
/// assert_eq!(retry.backoff(1), Duration::from_millis(100));
/// assert_eq!(retry.backoff(2), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delivery attempts allowed per request, including the first.
    pub max_attempts: u32,
    /// Delay before the first resend, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive resends.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// A policy that never resends.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the first resend delay.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay cap.
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff_ms = delay.as_millis() as u64;
        self
    }

    /// Whether a request that has been delivered `attempts` times may be
    /// delivered again.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before resend number `retry` (1-indexed).
    ///
    /// `initial * multiplier^(retry - 1)`, capped at the maximum.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exp);
        let delay = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}
