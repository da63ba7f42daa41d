//! Queue configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::disk::DEFAULT_MAX_BYTES;
use crate::error::QueueError;
use crate::request::markers::DEFAULT_SLOW_THRESHOLD_MS;

/// Default number of network dispatcher threads.
pub const DEFAULT_THREAD_POOL_SIZE: usize = 4;

/// Tunables for a [`RequestQueue`](crate::queue::RequestQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of network dispatcher threads.
    pub thread_pool_size: usize,
    /// Directory for the default disk cache. `None` selects the
    /// in-memory cache unless one is injected explicitly.
    pub cache_dir: Option<PathBuf>,
    /// Byte budget of the default disk cache.
    pub max_cache_bytes: u64,
    /// Requests running longer than this dump their marker timeline at
    /// debug level when they finish.
    pub slow_request_threshold_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
            cache_dir: None,
            max_cache_bytes: DEFAULT_MAX_BYTES,
            slow_request_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
        }
    }
}

impl QueueConfig {
    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.thread_pool_size == 0 {
            return Err(QueueError::invalid_configuration(
                "thread_pool_size cannot be zero",
            ));
        }
        if self.max_cache_bytes == 0 {
            return Err(QueueError::invalid_configuration(
                "max_cache_bytes cannot be zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config = QueueConfig { thread_pool_size: 0, ..QueueConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cache_budget_is_rejected() {
        let config = QueueConfig { max_cache_bytes: 0, ..QueueConfig::default() };
        assert!(config.validate().is_err());
    }
}
