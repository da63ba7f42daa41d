//! Fluent construction for [`RequestQueue`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{Cache, DiskCache, MemoryCache};
use crate::config::QueueConfig;
use crate::delivery::{DeliveryExecutor, DeliveryThread, ExecutorDelivery};
use crate::error::QueueError;
use crate::net::Network;
use crate::queue::{new_core, RequestQueue};

/// Builder wiring a [`RequestQueue`] from its configuration and
/// collaborators. A network transport is mandatory; the cache defaults to
/// [`DiskCache`] when a directory is configured and [`MemoryCache`]
/// otherwise; the delivery context defaults to a dedicated thread.
pub struct RequestQueueBuilder {
    config: QueueConfig,
    cache: Option<Arc<dyn Cache>>,
    network: Option<Arc<dyn Network>>,
    executor: Option<Arc<dyn DeliveryExecutor>>,
}

impl RequestQueueBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            cache: None,
            network: None,
            executor: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of network dispatcher threads.
    pub fn thread_pool_size(mut self, size: usize) -> Self {
        self.config.thread_pool_size = size;
        self
    }

    /// Use a disk cache rooted at `dir` (unless an explicit cache is
    /// also injected, which wins).
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Byte budget for the default disk cache.
    pub fn max_cache_bytes(mut self, max_bytes: u64) -> Self {
        self.config.max_cache_bytes = max_bytes;
        self
    }

    /// Slow-request threshold for marker-log dumps.
    pub fn slow_request_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.config.slow_request_threshold_ms = threshold_ms;
        self
    }

    /// Inject a cache implementation.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Inject the network transport. Mandatory.
    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Inject the callback context.
    pub fn delivery_executor(mut self, executor: Arc<dyn DeliveryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validate and assemble the queue. The queue is not started.
    pub fn build(self) -> Result<RequestQueue, QueueError> {
        self.config.validate()?;
        let network = self
            .network
            .ok_or_else(|| QueueError::invalid_configuration("a network transport is required"))?;

        let cache: Arc<dyn Cache> = match self.cache {
            Some(cache) => cache,
            None => match &self.config.cache_dir {
                Some(dir) => {
                    Arc::new(DiskCache::new(dir.clone()).with_max_bytes(self.config.max_cache_bytes))
                }
                None => Arc::new(MemoryCache::new()),
            },
        };

        let executor: Arc<dyn DeliveryExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(
                DeliveryThread::spawn().map_err(|e| QueueError::worker_spawn(e.to_string()))?,
            ),
        };

        let delivery = Arc::new(ExecutorDelivery::new(executor));
        Ok(RequestQueue::from_parts(new_core(
            self.config,
            cache,
            network,
            delivery,
        )))
    }
}
