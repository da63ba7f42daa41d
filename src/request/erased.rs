//! Type-erased request surface used at the dispatcher boundary.
//!
//! Dispatchers, queues and transports never see the payload type. They
//! operate on [`ErasedRequest`] (read-only facts plus cancellation) and,
//! inside the crate, on [`DispatchRequest`] (lifecycle mutation, parsing
//! into a boxed payload, delivery). The payload crosses the boundary as
//! `Box<dyn Any + Send>` and is recovered in the typed listener.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use bytes::Bytes;

use crate::cache::policy::parse_cache_headers;
use crate::cache::CacheEntry;
use crate::error::RequestError;
use crate::net::NetworkResponse;
use crate::queue::QueueCore;
use crate::request::markers::Marker;
use crate::request::retry::RetryPolicy;
use crate::request::{Method, Priority, Request};

/// Read-only view of a request, independent of its payload type. This is
/// what [`Network`](crate::net::Network) implementations receive.
pub trait ErasedRequest: Send + Sync {
    /// HTTP method.
    fn method(&self) -> Method;
    /// Request URL.
    fn url(&self) -> &str;
    /// Cache key (defaults to the URL).
    fn cache_key(&self) -> &str;
    /// Dispatch priority.
    fn priority(&self) -> Priority;
    /// Queue-assigned sequence number.
    fn sequence(&self) -> u64;
    /// Cancellation tag, when set.
    fn tag(&self) -> Option<&str>;
    /// Extra request headers for the transport.
    fn headers(&self) -> &HashMap<String, String>;
    /// Request body for the transport.
    fn body(&self) -> Option<&Bytes>;
    /// Whether responses may be cached.
    fn should_cache(&self) -> bool;
    /// True once the request has been canceled.
    fn is_canceled(&self) -> bool;
    /// Cooperatively cancel the request.
    fn cancel(&self);
    /// True once the request has fully finished.
    fn is_finished(&self) -> bool;
    /// Stale entry to revalidate against, set by the cache dispatcher.
    fn cache_entry(&self) -> Option<CacheEntry>;
    /// Retry strategy for the transport to drive.
    fn retry_policy(&self) -> &dyn RetryPolicy;
    /// Snapshot of the lifecycle marker log.
    fn markers(&self) -> Vec<Marker>;
}

/// Parsed response crossing the dispatcher boundary with its payload
/// type erased.
pub(crate) struct ErasedResponse {
    /// The parsed `T`, recovered by the typed listener.
    pub(crate) payload: Box<dyn Any + Send>,
    /// Entry derived from the response's cache headers, when cacheable.
    pub(crate) cache_entry: Option<CacheEntry>,
    /// True for a stale-but-usable cache delivery that a network refresh
    /// will follow.
    pub(crate) intermediate: bool,
}

/// Crate-internal lifecycle operations on an erased request.
pub(crate) trait DispatchRequest: ErasedRequest {
    /// View as the transport-facing trait object.
    fn as_erased(&self) -> &dyn ErasedRequest;
    /// Assign the queue sequence number. Called once by `add`.
    fn assign_sequence(&self, sequence: u64);
    /// Bind the owning queue for end-of-life notification.
    fn bind_queue(&self, queue: Weak<QueueCore>, slow_threshold_ms: u64);
    /// Record the stale entry whose validators the transport must send.
    fn set_cache_entry(&self, entry: CacheEntry);
    /// Flag that a response has reached the delivery stage.
    fn mark_delivered(&self);
    /// Whether a response has already been delivered (drives the 304
    /// suppression).
    fn has_response_delivered(&self) -> bool;
    /// Append a lifecycle marker.
    fn add_marker(&self, name: &str);
    /// Terminal transition: record the reason, emit the marker log, and
    /// notify the owning queue exactly once.
    fn finish(&self, reason: &str);
    /// Run the typed parser against a raw response.
    fn parse_network_response(&self, response: &NetworkResponse)
    -> Result<ErasedResponse, RequestError>;
    /// Let the request refine a transport error before delivery.
    fn parse_network_error(&self, error: RequestError) -> RequestError;
    /// Hand the parsed payload to the listener. Delivery-context only.
    fn deliver_response(&self, response: ErasedResponse);
    /// Hand a terminal error to the listener. Delivery-context only.
    fn deliver_error(&self, error: RequestError);
}

impl<T: Send + 'static> ErasedRequest for Request<T> {
    fn method(&self) -> Method {
        self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn cache_key(&self) -> &str {
        &self.cache_key
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    fn should_cache(&self) -> bool {
        self.should_cache
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn cache_entry(&self) -> Option<CacheEntry> {
        self.cache_entry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn retry_policy(&self) -> &dyn RetryPolicy {
        self.retry_policy.as_ref()
    }

    fn markers(&self) -> Vec<Marker> {
        self.markers.snapshot()
    }
}

impl<T: Send + 'static> DispatchRequest for Request<T> {
    fn as_erased(&self) -> &dyn ErasedRequest {
        self
    }

    fn assign_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::Release);
    }

    fn bind_queue(&self, queue: Weak<QueueCore>, slow_threshold_ms: u64) {
        self.markers.set_slow_threshold(slow_threshold_ms);
        *self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(queue);
    }

    fn set_cache_entry(&self, entry: CacheEntry) {
        *self
            .cache_entry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(entry);
    }

    fn mark_delivered(&self) {
        self.delivered.store(true, Ordering::Release);
    }

    fn has_response_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    fn add_marker(&self, name: &str) {
        self.markers.add(name);
    }

    fn finish(&self, reason: &str) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        self.markers.add(reason);
        self.markers
            .finish(&format!("{} {}", self.method.as_str(), self.url));
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(core) = queue.and_then(|weak| weak.upgrade()) {
            core.on_request_finished(self.sequence(), &self.cache_key, self.should_cache);
        }
    }

    fn parse_network_response(
        &self,
        response: &NetworkResponse,
    ) -> Result<ErasedResponse, RequestError> {
        let payload = (self.parser)(response)?;
        Ok(ErasedResponse {
            payload: Box::new(payload),
            cache_entry: parse_cache_headers(response),
            intermediate: false,
        })
    }

    fn parse_network_error(&self, error: RequestError) -> RequestError {
        error
    }

    fn deliver_response(&self, response: ErasedResponse) {
        match response.payload.downcast::<T>() {
            Ok(payload) => self
                .listener
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .on_response(*payload),
            Err(_) => log::error!("response payload type mismatch for {}", self.url),
        }
    }

    fn deliver_error(&self, error: RequestError) {
        self.listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .on_error(error);
    }
}

/// Shared, type-erased request as it travels through the queues.
pub(crate) type SharedRequest = Arc<dyn DispatchRequest>;
