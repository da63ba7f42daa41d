//! Request queue: the coordinator that owns both dispatch queues, the
//! in-flight registry, and the waiting list that collapses duplicate
//! requests onto a single network call.

pub mod builder;
pub(crate) mod priority;

pub use builder::RequestQueueBuilder;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_utils::CachePadded;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::Cache;
use crate::config::QueueConfig;
use crate::delivery::ResponseDelivery;
use crate::dispatch::{CacheWorker, NetworkWorker};
use crate::error::{CacheError, QueueError};
use crate::net::Network;
use crate::request::erased::{ErasedRequest, SharedRequest};
use crate::request::{Request, RequestHandle};
use priority::DispatchQueue;

/// Shared interior of a [`RequestQueue`]. Dispatch workers and the weak
/// back-references inside requests point here.
pub(crate) struct QueueCore {
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) delivery: Arc<dyn ResponseDelivery>,
    pub(crate) cache_queue: Arc<DispatchQueue>,
    pub(crate) network_queue: Arc<DispatchQueue>,
    pub(crate) quit: AtomicBool,
    config: QueueConfig,
    /// Every request between `add` and `finish`, keyed by sequence.
    current: DashMap<u64, SharedRequest>,
    /// Cacheable requests suppressed behind an in-flight leader with the
    /// same cache key.
    waiting: DashMap<String, Vec<SharedRequest>>,
    sequence: CachePadded<AtomicU64>,
}

impl QueueCore {
    /// Assign identity, register, and route a new request.
    pub(crate) fn enqueue(self: &Arc<Self>, request: SharedRequest) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        request.assign_sequence(sequence);
        request.bind_queue(Arc::downgrade(self), self.config.slow_request_threshold_ms);
        request.add_marker("add-to-queue");
        self.current.insert(sequence, request.clone());

        // Uncacheable requests cannot be collapsed or answered from the
        // cache; they go straight to the network queue.
        if !request.should_cache() {
            self.network_queue.put(request);
            return;
        }

        let key = request.cache_key().to_string();
        match self.waiting.entry(key) {
            Entry::Occupied(mut occupied) => {
                request.add_marker("waiting-for-response");
                occupied.get_mut().push(request);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Vec::new());
                self.cache_queue.put(request);
            }
        }
    }

    /// End-of-life notification from a request. Unregisters it and, for
    /// cacheable requests, replays any collapsed followers onto the cache
    /// queue where they will usually hit the freshly written entry.
    pub(crate) fn on_request_finished(&self, sequence: u64, cache_key: &str, should_cache: bool) {
        self.current.remove(&sequence);
        if should_cache
            && let Some((_, waiters)) = self.waiting.remove(cache_key)
        {
            if !waiters.is_empty() {
                log::debug!("releasing {} requests waiting for {cache_key}", waiters.len());
            }
            for waiter in waiters {
                self.cache_queue.put(waiter);
            }
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.current.len()
    }
}

/// Client-side HTTP request scheduler.
///
/// Owns one cache dispatcher thread and a pool of network dispatcher
/// threads, both draining priority queues. Built through
/// [`RequestQueueBuilder`]; call [`start`](Self::start) before adding
/// requests (requests added earlier are queued, not lost).
pub struct RequestQueue {
    core: Arc<QueueCore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<Option<Sender<()>>>,
}

impl RequestQueue {
    /// Start building a queue.
    pub fn builder() -> RequestQueueBuilder {
        RequestQueueBuilder::new()
    }

    pub(crate) fn from_parts(core: Arc<QueueCore>) -> Self {
        Self {
            core,
            workers: Mutex::new(Vec::new()),
            shutdown: Mutex::new(None),
        }
    }

    /// Spawn the dispatcher threads. Any previously running generation
    /// is stopped first, so `start` is safe to call repeatedly.
    pub fn start(&self) -> Result<(), QueueError> {
        self.stop();
        self.core.quit.store(false, Ordering::Release);

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut spawned = Vec::with_capacity(1 + self.core.config.thread_pool_size);

        let result = self.spawn_workers(&mut spawned, &shutdown_rx);
        if let Err(err) = result {
            // Tear down whatever came up before the failure.
            self.core.quit.store(true, Ordering::Release);
            drop(shutdown_tx);
            for handle in spawned {
                let _ = handle.join();
            }
            return Err(err);
        }

        *self.lock_workers() = spawned;
        *self.lock_shutdown() = Some(shutdown_tx);
        log::debug!(
            "request queue started: 1 cache dispatcher, {} network dispatchers",
            self.core.config.thread_pool_size
        );
        Ok(())
    }

    fn spawn_workers(
        &self,
        spawned: &mut Vec<JoinHandle<()>>,
        shutdown_rx: &Receiver<()>,
    ) -> Result<(), QueueError> {
        let cache_worker = CacheWorker::new(self.core.clone(), shutdown_rx.clone());
        let handle = std::thread::Builder::new()
            .name("quiver-cache".to_string())
            .spawn(move || cache_worker.run())
            .map_err(|e| QueueError::worker_spawn(e.to_string()))?;
        spawned.push(handle);

        for index in 0..self.core.config.thread_pool_size {
            let network_worker = NetworkWorker::new(self.core.clone(), shutdown_rx.clone());
            let handle = std::thread::Builder::new()
                .name(format!("quiver-net-{index}"))
                .spawn(move || network_worker.run())
                .map_err(|e| QueueError::worker_spawn(e.to_string()))?;
            spawned.push(handle);
        }
        Ok(())
    }

    /// Stop the dispatcher threads. Queued requests are retained and
    /// picked up again by a later [`start`](Self::start); requests
    /// mid-flight finish their current step but nothing new is taken.
    pub fn stop(&self) {
        self.core.quit.store(true, Ordering::Release);
        // Dropping the sender closes the shutdown channel, waking every
        // blocked take.
        self.lock_shutdown().take();
        let workers = std::mem::take(&mut *self.lock_workers());
        for handle in workers {
            let _ = handle.join();
        }
    }

    /// Schedule a request. The returned handle supports cancellation and
    /// lifecycle inspection.
    pub fn add<T: Send + 'static>(&self, request: Request<T>) -> RequestHandle {
        let shared: SharedRequest = Arc::new(request);
        self.core.enqueue(shared.clone());
        RequestHandle::new(shared)
    }

    /// Set the cancellation flag on every in-flight request matching the
    /// filter. Matching requests finish without a listener callback.
    pub fn cancel_all(&self, filter: impl Fn(&dyn ErasedRequest) -> bool) {
        for entry in self.core.current.iter() {
            if filter(entry.value().as_erased()) {
                entry.value().cancel();
            }
        }
    }

    /// Cancel every in-flight request carrying `tag`.
    pub fn cancel_all_with_tag(&self, tag: &str) {
        self.cancel_all(|request| request.tag() == Some(tag));
    }

    /// The cache this queue reads and writes.
    pub fn cache(&self) -> Arc<dyn Cache> {
        self.core.cache.clone()
    }

    /// Expire a cached entry in place. With `full_expire` the entry will
    /// not be served without revalidation; otherwise the next hit serves
    /// it once and triggers a refresh.
    pub fn invalidate(&self, cache_key: &str, full_expire: bool) -> Result<(), CacheError> {
        self.core.cache.invalidate(cache_key, full_expire)
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.core.cache.clear()
    }

    /// Requests between `add` and `finish`.
    pub fn in_flight(&self) -> usize {
        self.core.in_flight()
    }

    /// Requests currently sitting in the dispatch queues, waiting for a
    /// worker.
    pub fn pending(&self) -> usize {
        self.core.cache_queue.len() + self.core.network_queue.len()
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_shutdown(&self) -> std::sync::MutexGuard<'_, Option<Sender<()>>> {
        self.shutdown
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn new_core(
    config: QueueConfig,
    cache: Arc<dyn Cache>,
    network: Arc<dyn Network>,
    delivery: Arc<dyn ResponseDelivery>,
) -> Arc<QueueCore> {
    Arc::new(QueueCore {
        cache,
        network,
        delivery,
        cache_queue: Arc::new(DispatchQueue::new()),
        network_queue: Arc::new(DispatchQueue::new()),
        quit: AtomicBool::new(false),
        config,
        current: DashMap::new(),
        waiting: DashMap::new(),
        sequence: CachePadded::new(AtomicU64::new(0)),
    })
}
