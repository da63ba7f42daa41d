//! Retry strategy seam, driven by the transport.
//!
//! The dispatch engine never retries by itself: the injected
//! [`Network`](crate::net::Network) implementation consults the request's
//! policy between attempts and surfaces exhaustion as the terminal error.
//! State is interior-mutable so the transport can drive the policy
//! through the shared request handle.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::RequestError;

/// Per-request retry strategy.
pub trait RetryPolicy: Send + Sync {
    /// Socket/read timeout for the next attempt, in milliseconds.
    fn current_timeout_ms(&self) -> u64;

    /// Attempts made so far.
    fn retry_count(&self) -> u32;

    /// Account one failed attempt. Returns `Ok(())` when another attempt
    /// may be made (after backing the timeout off), or the terminal error
    /// when the budget is exhausted.
    fn retry(&self, error: &RequestError) -> Result<(), RequestError>;
}

/// Multiplicative-backoff policy: each retry grows the timeout by
/// `timeout * multiplier`.
#[derive(Debug)]
pub struct DefaultRetryPolicy {
    current_timeout_ms: AtomicU64,
    attempts: AtomicU32,
    max_retries: u32,
    backoff_multiplier: f32,
}

/// Default socket timeout: 2.5 seconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_500;
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 1.0;

impl DefaultRetryPolicy {
    /// Policy with the stock defaults.
    pub fn new() -> Self {
        Self::with_values(DEFAULT_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_MULTIPLIER)
    }

    /// Policy with explicit timeout, retry budget and multiplier.
    pub fn with_values(timeout_ms: u64, max_retries: u32, backoff_multiplier: f32) -> Self {
        Self {
            current_timeout_ms: AtomicU64::new(timeout_ms),
            attempts: AtomicU32::new(0),
            max_retries,
            backoff_multiplier,
        }
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn current_timeout_ms(&self) -> u64 {
        self.current_timeout_ms.load(Ordering::Relaxed)
    }

    fn retry_count(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn retry(&self, error: &RequestError) -> Result<(), RequestError> {
        let attempts = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let timeout = self.current_timeout_ms.load(Ordering::Relaxed);
        let grown = timeout + (timeout as f32 * self.backoff_multiplier) as u64;
        self.current_timeout_ms.store(grown, Ordering::Relaxed);
        if attempts <= self.max_retries {
            Ok(())
        } else {
            Err(error.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_the_timeout() {
        let policy = DefaultRetryPolicy::with_values(1_000, 2, 1.0);
        assert_eq!(policy.current_timeout_ms(), 1_000);
        assert!(policy.retry(&RequestError::timeout()).is_ok());
        assert_eq!(policy.current_timeout_ms(), 2_000);
        assert!(policy.retry(&RequestError::timeout()).is_ok());
        assert_eq!(policy.current_timeout_ms(), 4_000);
    }

    #[test]
    fn exhaustion_returns_the_terminal_error() {
        let policy = DefaultRetryPolicy::with_values(1_000, 1, 1.0);
        assert!(policy.retry(&RequestError::timeout()).is_ok());
        let err = policy.retry(&RequestError::timeout()).unwrap_err();
        assert!(matches!(err, RequestError::Timeout { .. }));
        assert_eq!(policy.retry_count(), 2);
    }

    #[test]
    fn zero_retries_fails_immediately() {
        let policy = DefaultRetryPolicy::with_values(1_000, 0, 2.0);
        assert!(policy.retry(&RequestError::no_connection()).is_err());
    }
}
