//! Convenient access to the commonly used types.
//!
//! ```rust
//! use quiver::prelude::*;
//! ```

pub use crate::cache::{Cache, CacheEntry, DiskCache, MemoryCache};
pub use crate::config::QueueConfig;
pub use crate::delivery::{DeliveryExecutor, DeliveryThread, InlineExecutor};
pub use crate::error::{CacheError, QueueError, RequestError};
pub use crate::net::{Network, NetworkResponse};
pub use crate::queue::{RequestQueue, RequestQueueBuilder};
pub use crate::request::retry::{DefaultRetryPolicy, RetryPolicy};
pub use crate::request::{Method, Priority, Request, RequestBuilder, RequestHandle, RequestListener};
