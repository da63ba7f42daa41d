//! Dispatcher worker threads.
//!
//! One [`CacheWorker`] triages requests against the cache; a pool of
//! [`NetworkWorker`]s performs round trips, writes back to the cache and
//! posts results. Both block on their queue's `take` and wake through the
//! shared shutdown channel.

mod cache_worker;
mod network_worker;

pub(crate) use cache_worker::CacheWorker;
pub(crate) use network_worker::NetworkWorker;
