//! Request entity, its builder, and the caller-facing handle.
//!
//! A [`Request`] owns everything the dispatch engine needs: identity,
//! priority, cache eligibility, the response parser, the listener, and
//! the mutable lifecycle state (cancellation flag, delivery flag, cache
//! hint, marker log). Requests move through the engine as type-erased
//! trait objects; the typed parser and listener are the only places the
//! payload type reappears.

pub mod erased;
pub mod markers;
pub mod retry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::net::NetworkResponse;
use crate::queue::QueueCore;
use erased::DispatchRequest;
use markers::{Marker, MarkerLog};
use retry::{DefaultRetryPolicy, RetryPolicy};

/// Dispatch priority. Both queues order by priority first, then by
/// arrival sequence within a priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work, dispatched last.
    Low,
    /// The default.
    Normal,
    /// Dispatched before normal traffic.
    High,
    /// Jumps every queue.
    Immediate,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
        }
    }
}

/// Receives the outcome of a request on the delivery context.
///
/// `on_response` runs once for a plain completion, or twice when a
/// stale-but-usable cache entry is served ahead of a network refresh. At
/// most one of the terminal calls happens; never both a terminal
/// response and an error.
pub trait RequestListener<T>: Send {
    /// A parsed response, from cache or network.
    fn on_response(&mut self, response: T);

    /// Terminal failure.
    fn on_error(&mut self, error: RequestError);
}

/// Listener assembled from plain closures.
struct FnListener<T: Send + 'static> {
    on_response: Box<dyn FnMut(T) + Send>,
    on_error: Box<dyn FnMut(RequestError) + Send>,
}

impl<T: Send + 'static> RequestListener<T> for FnListener<T> {
    fn on_response(&mut self, response: T) {
        (self.on_response)(response);
    }

    fn on_error(&mut self, error: RequestError) {
        (self.on_error)(error);
    }
}

type Parser<T> = Box<dyn Fn(&NetworkResponse) -> Result<T, RequestError> + Send + Sync>;

/// One schedulable HTTP request producing a `T`.
pub struct Request<T: Send + 'static> {
    method: Method,
    url: String,
    cache_key: String,
    priority: Priority,
    should_cache: bool,
    tag: Option<String>,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    retry_policy: Box<dyn RetryPolicy>,
    parser: Parser<T>,
    listener: Mutex<Box<dyn RequestListener<T>>>,
    sequence: AtomicU64,
    canceled: AtomicBool,
    delivered: AtomicBool,
    finished: AtomicBool,
    cache_entry: Mutex<Option<crate::cache::CacheEntry>>,
    markers: MarkerLog,
    queue: Mutex<Option<Weak<QueueCore>>>,
}

impl<T: Send + 'static> Request<T> {
    /// Start building a request. The parser turns a raw network response
    /// into the typed payload; it also runs against synthesized responses
    /// built from cache entries.
    pub fn builder(
        method: Method,
        url: impl Into<String>,
        parser: impl Fn(&NetworkResponse) -> Result<T, RequestError> + Send + Sync + 'static,
    ) -> RequestBuilder<T> {
        RequestBuilder::new(method, url.into(), Box::new(parser))
    }

    /// Shorthand for a GET request builder.
    pub fn get(
        url: impl Into<String>,
        parser: impl Fn(&NetworkResponse) -> Result<T, RequestError> + Send + Sync + 'static,
    ) -> RequestBuilder<T> {
        Self::builder(Method::Get, url, parser)
    }
}

/// Fluent construction for [`Request`].
pub struct RequestBuilder<T: Send + 'static> {
    method: Method,
    url: String,
    cache_key: Option<String>,
    priority: Priority,
    should_cache: bool,
    tag: Option<String>,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    retry_policy: Option<Box<dyn RetryPolicy>>,
    parser: Parser<T>,
    on_response: Option<Box<dyn FnMut(T) + Send>>,
    on_error: Option<Box<dyn FnMut(RequestError) + Send>>,
    listener: Option<Box<dyn RequestListener<T>>>,
}

impl<T: Send + 'static> RequestBuilder<T> {
    fn new(method: Method, url: String, parser: Parser<T>) -> Self {
        Self {
            method,
            url,
            cache_key: None,
            priority: Priority::Normal,
            should_cache: true,
            tag: None,
            headers: HashMap::new(),
            body: None,
            retry_policy: None,
            parser,
            on_response: None,
            on_error: None,
            listener: None,
        }
    }

    /// Override the cache key. Defaults to the URL.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Set the dispatch priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Disable (or re-enable) caching. Uncacheable requests skip the
    /// cache dispatcher entirely.
    pub fn should_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = should_cache;
        self
    }

    /// Tag for bulk cancellation.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Add a request header handed to the transport.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Request body handed to the transport.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the retry policy. Defaults to [`DefaultRetryPolicy`].
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Box::new(policy));
        self
    }

    /// Success callback.
    pub fn on_response(mut self, callback: impl FnMut(T) + Send + 'static) -> Self {
        self.on_response = Some(Box::new(callback));
        self
    }

    /// Error callback.
    pub fn on_error(mut self, callback: impl FnMut(RequestError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Full listener; takes precedence over the closure callbacks.
    pub fn listener(mut self, listener: impl RequestListener<T> + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Assemble the request.
    pub fn build(self) -> Request<T> {
        let listener: Box<dyn RequestListener<T>> = match self.listener {
            Some(listener) => listener,
            None => Box::new(FnListener {
                on_response: self.on_response.unwrap_or_else(|| Box::new(|_| {})),
                on_error: self
                    .on_error
                    .unwrap_or_else(|| Box::new(|e| log::warn!("unhandled request error: {e}"))),
            }),
        };
        Request {
            method: self.method,
            cache_key: self.cache_key.unwrap_or_else(|| self.url.clone()),
            url: self.url,
            priority: self.priority,
            should_cache: self.should_cache,
            tag: self.tag,
            headers: self.headers,
            body: self.body,
            retry_policy: self
                .retry_policy
                .unwrap_or_else(|| Box::new(DefaultRetryPolicy::new())),
            parser: self.parser,
            listener: Mutex::new(listener),
            sequence: AtomicU64::new(0),
            canceled: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            cache_entry: Mutex::new(None),
            markers: MarkerLog::new(),
            queue: Mutex::new(None),
        }
    }
}

/// Cloneable handle returned by
/// [`RequestQueue::add`](crate::queue::RequestQueue::add); the caller's
/// view of an in-flight request.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<dyn DispatchRequest>,
}

impl RequestHandle {
    pub(crate) fn new(inner: Arc<dyn DispatchRequest>) -> Self {
        Self { inner }
    }

    /// Cooperatively cancel the request. No listener callback will fire
    /// after the flag is observed at a delivery point.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// True once [`cancel`](Self::cancel) has been called.
    pub fn is_canceled(&self) -> bool {
        self.inner.is_canceled()
    }

    /// True once the request has fully finished (delivered, discarded or
    /// canceled).
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Queue-assigned sequence number.
    pub fn sequence(&self) -> u64 {
        self.inner.sequence()
    }

    /// Request URL.
    pub fn url(&self) -> String {
        self.inner.url().to_string()
    }

    /// Cache key.
    pub fn cache_key(&self) -> String {
        self.inner.cache_key().to_string()
    }

    /// Cancellation tag, when set.
    pub fn tag(&self) -> Option<String> {
        self.inner.tag().map(str::to_string)
    }

    /// Snapshot of the lifecycle marker log.
    pub fn markers(&self) -> Vec<Marker> {
        self.inner.markers()
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("url", &self.inner.url())
            .field("sequence", &self.inner.sequence())
            .field("canceled", &self.inner.is_canceled())
            .field("finished", &self.inner.is_finished())
            .finish()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("should_cache", &self.should_cache)
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}
