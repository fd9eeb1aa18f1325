//! Retry policy for backend calls.
//!
//! Exponential backoff: the n-th retry (0-based) waits
//! `base_delay * multiplier^n`, capped at `max_delay`.

use crate::error::{BackendErrorCode, BridgeError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    /// Multiplier applied after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether `error` may be retried after `retries_done` retries.
    pub fn should_retry(&self, error: &BridgeError, retries_done: u32) -> bool {
        is_retryable(error) && retries_done < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::context::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Transport failures, 5xx and 429 are transient; everything else is final.
pub fn is_retryable(error: &BridgeError) -> bool {
    matches!(
        error.backend_code(),
        Some(BackendErrorCode::ServerError)
            | Some(BackendErrorCode::RateLimited)
            | Some(BackendErrorCode::NetworkError)
    )
}
