//! Quiver - client-side HTTP request scheduling and caching
//!
//! Quiver accepts asynchronous HTTP requests from application code,
//! serves them from a local cache when possible, fetches from the network
//! when not, and delivers parsed results back on a designated callback
//! context.
//!
//! # Features
//!
//! - **Priority dispatch**: two cooperating worker pools draining
//!   priority queues, FIFO within a priority class
//! - **HTTP freshness model**: fresh / refresh-needed / expired entries
//!   with `If-None-Match` / `If-Modified-Since` revalidation hints
//! - **Stale-while-revalidate**: soft-expired hits are delivered
//!   immediately and refreshed in the background
//! - **Duplicate collapsing**: concurrent requests with the same cache
//!   key ride on a single network call
//! - **Cooperative cancellation**: short-circuits at cache take, network
//!   take, and delivery time; canceled requests never reach a listener
//! - **Pluggable collaborators**: network transport, cache store, retry
//!   policy, and callback context are all injected traits
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quiver::prelude::*;
//!
//! # struct MyTransport;
//! # impl Network for MyTransport {
//! #     fn perform_request(
//! #         &self,
//! #         _request: &dyn quiver::request::erased::ErasedRequest,
//! #     ) -> Result<NetworkResponse, RequestError> {
//! #         Err(RequestError::no_connection())
//! #     }
//! # }
//! let queue = RequestQueue::builder()
//!     .network(Arc::new(MyTransport))
//!     .cache_dir("/tmp/quiver-cache")
//!     .build()
//!     .expect("valid configuration");
//! queue.start().expect("workers spawned");
//!
//! let request = Request::get("https://example.com/api", |response| {
//!     String::from_utf8(response.data.to_vec())
//!         .map_err(|e| RequestError::parse(e.to_string()))
//! })
//! .on_response(|body| println!("got {body}"))
//! .on_error(|err| eprintln!("failed: {err}"))
//! .build();
//!
//! let handle = queue.add(request);
//! # drop(handle);
//! ```

pub mod cache;
pub mod config;
pub mod delivery;
pub mod error;
pub mod net;
pub mod prelude;
pub mod queue;
pub mod request;

pub(crate) mod dispatch;

pub use cache::{Cache, CacheEntry, DiskCache, MemoryCache};
pub use config::QueueConfig;
pub use delivery::{DeliveryExecutor, DeliveryThread, InlineExecutor};
pub use error::{CacheError, QueueError, RequestError};
pub use net::{Network, NetworkResponse};
pub use queue::{RequestQueue, RequestQueueBuilder};
pub use request::{Method, Priority, Request, RequestBuilder, RequestHandle, RequestListener};
