//! Network dispatch worker.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::error::RequestError;
use crate::queue::QueueCore;
use crate::request::erased::SharedRequest;

/// One thread of the network pool. Performs the round trip through the
/// injected transport, writes cacheable responses back, and posts the
/// outcome to the delivery context.
pub(crate) struct NetworkWorker {
    core: Arc<QueueCore>,
    shutdown: Receiver<()>,
}

impl NetworkWorker {
    pub(crate) fn new(core: Arc<QueueCore>, shutdown: Receiver<()>) -> Self {
        Self { core, shutdown }
    }

    pub(crate) fn run(self) {
        log::debug!("network dispatcher started");
        loop {
            let Some(request) = self.core.network_queue.take(&self.shutdown) else {
                if !self.core.quit.load(Ordering::Acquire) {
                    log::warn!("network dispatcher woken without quit, exiting");
                }
                log::debug!("network dispatcher quitting");
                return;
            };
            self.dispatch(request, Instant::now());
        }
    }

    fn dispatch(&self, request: SharedRequest, started: Instant) {
        request.add_marker("network-queue-take");

        // A canceled request is dropped before any traffic is spent on
        // it; no listener fires.
        if request.is_canceled() {
            request.finish("network-discard-cancelled");
            return;
        }

        let response = match self.core.network.perform_request(request.as_erased()) {
            Ok(response) => response,
            Err(error) => {
                self.deliver_error(request, error, started);
                return;
            }
        };
        request.add_marker("network-http-complete");

        // A 304 for a request that already got its intermediate cache
        // delivery has nothing new to say; suppress the duplicate
        // callback. A 304 without a prior delivery parses normally: the
        // transport has filled in the stale body.
        if response.not_modified && request.has_response_delivered() {
            request.finish("not-modified");
            return;
        }

        let parsed = match request.parse_network_response(&response) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.deliver_error(request, error, started);
                return;
            }
        };
        request.add_marker("network-parse-complete");

        if request.should_cache()
            && let Some(entry) = parsed.cache_entry.clone()
        {
            match self.core.cache.put(request.cache_key(), entry) {
                Ok(()) => request.add_marker("network-cache-written"),
                Err(err) => {
                    log::warn!("cache write failed for {}: {err}", request.cache_key());
                }
            }
        }

        request.mark_delivered();
        self.core.delivery.post_response(request, parsed);
    }

    fn deliver_error(&self, request: SharedRequest, mut error: RequestError, started: Instant) {
        error.set_network_time(started.elapsed().as_millis() as u64);
        let refined = request.parse_network_error(error);
        self.core.delivery.post_error(request, refined);
    }
}
