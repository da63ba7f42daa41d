//! Cache triage worker.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::net::NetworkResponse;
use crate::queue::QueueCore;
use crate::request::erased::SharedRequest;

/// Single thread resolving requests from the cache. Misses and entries
/// past their hard expiry are forwarded to the network queue; fresh hits
/// are delivered directly; hits inside the stale window are delivered as
/// intermediate results and then refreshed over the network.
pub(crate) struct CacheWorker {
    core: Arc<QueueCore>,
    shutdown: Receiver<()>,
}

impl CacheWorker {
    pub(crate) fn new(core: Arc<QueueCore>, shutdown: Receiver<()>) -> Self {
        Self { core, shutdown }
    }

    pub(crate) fn run(self) {
        log::debug!("cache dispatcher started");
        if let Err(err) = self.core.cache.initialize() {
            // A cache that cannot initialize degrades to permanent miss
            // semantics; requests still flow to the network.
            log::error!("cache initialization failed: {err}");
        }

        loop {
            let Some(request) = self.core.cache_queue.take(&self.shutdown) else {
                if !self.core.quit.load(Ordering::Acquire) {
                    log::warn!("cache dispatcher woken without quit, exiting");
                }
                log::debug!("cache dispatcher quitting");
                return;
            };
            self.triage(request);
        }
    }

    fn triage(&self, request: SharedRequest) {
        request.add_marker("cache-queue-take");

        if request.is_canceled() {
            request.finish("cache-discard-canceled");
            return;
        }

        let entry = match self.core.cache.get(request.cache_key()) {
            Ok(entry) => entry,
            Err(err) => {
                // Storage trouble is miss semantics, never a request
                // failure.
                log::warn!("cache read failed for {}: {err}", request.cache_key());
                None
            }
        };

        let Some(entry) = entry else {
            request.add_marker("cache-miss");
            self.core.network_queue.put(request);
            return;
        };

        if entry.is_expired() {
            // The entry is unusable as a response but its validators
            // still enable a conditional fetch.
            request.add_marker("cache-hit-expired");
            request.set_cache_entry(entry);
            self.core.network_queue.put(request);
            return;
        }

        request.add_marker("cache-hit");
        let synthesized =
            NetworkResponse::new(200, entry.data.clone(), entry.response_headers.clone());
        let mut parsed = match request.parse_network_response(&synthesized) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("cached entry for {} failed to parse: {err}", request.cache_key());
                self.core.delivery.post_error(request, err);
                return;
            }
        };
        request.add_marker("cache-hit-parsed");

        if !entry.refresh_needed() {
            self.core.delivery.post_response(request, parsed);
            return;
        }

        // Soft-expired: serve the cached result now, refresh over the
        // network afterwards. The refresh is enqueued from the delivery
        // context so the intermediate callback is guaranteed to run
        // first.
        request.add_marker("cache-hit-refresh-needed");
        request.set_cache_entry(entry);
        parsed.intermediate = true;

        let network_queue = self.core.network_queue.clone();
        let refresh_target = request.clone();
        self.core.delivery.post_response_then(
            request,
            parsed,
            Box::new(move || network_queue.put(refresh_target)),
        );
    }
}
