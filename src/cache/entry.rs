//! Cached response entry and its freshness predicates.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// A cached HTTP response body plus the metadata needed to decide whether
/// it can be served, must be refreshed, or must be revalidated.
///
/// All timestamps are absolute epoch milliseconds. `soft_ttl` is the point
/// after which the entry still serves once but triggers a background
/// refresh; `ttl` is the point after which it must not be served without
/// revalidation.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Raw response body.
    pub data: Bytes,
    /// Entity tag for `If-None-Match` revalidation.
    pub etag: Option<String>,
    /// Server `Date` header, epoch ms. Zero when absent.
    pub server_date: i64,
    /// Server `Last-Modified` header, epoch ms. Zero when absent.
    pub last_modified: i64,
    /// Hard expiry, epoch ms.
    pub ttl: i64,
    /// Soft expiry, epoch ms.
    pub soft_ttl: i64,
    /// Response headers as received.
    pub response_headers: HashMap<String, String>,
}

impl CacheEntry {
    /// True once the hard expiry has passed at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.ttl < now_ms
    }

    /// True once the soft expiry has passed at `now_ms`.
    pub fn refresh_needed_at(&self, now_ms: i64) -> bool {
        self.soft_ttl < now_ms
    }

    /// [`is_expired_at`](Self::is_expired_at) against the current clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(epoch_millis())
    }

    /// [`refresh_needed_at`](Self::refresh_needed_at) against the current
    /// clock.
    pub fn refresh_needed(&self) -> bool {
        self.refresh_needed_at(epoch_millis())
    }
}

/// Current wall time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
