//! Network transport seam.
//!
//! The crate performs no I/O of its own: a [`Network`] implementation is
//! injected into the request queue and owns the actual HTTP round trip,
//! including per-request retries and the mapping of transport failures to
//! [`RequestError`] kinds. This module defines the trait, the raw
//! [`NetworkResponse`] it produces, and the helpers a transport needs to
//! honour the revalidation contract.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use crate::cache::entry::CacheEntry;
use crate::error::RequestError;
use crate::request::erased::ErasedRequest;

/// Header injected from a cache hint's entity tag.
pub const HEADER_IF_NONE_MATCH: &str = "If-None-Match";
/// Header injected from a cache hint's last-modified stamp.
pub const HEADER_IF_MODIFIED_SINCE: &str = "If-Modified-Since";

/// Performs one HTTP round trip for a dispatched request.
///
/// Contract, beyond the obvious:
/// - when `request.cache_entry()` is set, the transport injects
///   `If-None-Match` / `If-Modified-Since` from it (see
///   [`revalidation_headers`]);
/// - the transport drives the request's
///   [`RetryPolicy`](crate::request::retry::RetryPolicy) and surfaces
///   exhaustion as the terminal error kind;
/// - on a 304 the transport synthesizes `data` from the stale entry so
///   the normal parse path succeeds even when no intermediate delivery
///   happened (see [`NetworkResponse::not_modified_from`]).
pub trait Network: Send + Sync {
    /// Execute the round trip. Blocking; called from network dispatcher
    /// threads.
    fn perform_request(&self, request: &dyn ErasedRequest) -> Result<NetworkResponse, RequestError>;
}

/// Raw result of one HTTP round trip.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub data: Bytes,
    /// Response headers, names as received.
    pub headers: HashMap<String, String>,
    /// True when the server answered 304 Not Modified.
    pub not_modified: bool,
    /// Round-trip duration as measured by the transport, in milliseconds.
    pub network_time_ms: u64,
}

impl NetworkResponse {
    /// Plain response from status, body and headers.
    pub fn new(status: u16, data: Bytes, headers: HashMap<String, String>) -> Self {
        Self { status, data, headers, not_modified: status == 304, network_time_ms: 0 }
    }

    /// Synthesize a 304 result from the stale entry the revalidation was
    /// based on. The entry's body and headers are carried over, with the
    /// 304's own headers layered on top, so a request that never saw an
    /// intermediate delivery can still parse a full body.
    pub fn not_modified_from(entry: &CacheEntry, headers: HashMap<String, String>) -> Self {
        let mut merged = entry.response_headers.clone();
        merged.extend(headers);
        Self {
            status: 304,
            data: entry.data.clone(),
            headers: merged,
            not_modified: true,
            network_time_ms: 0,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Conditional-request headers for revalidating a stale entry.
///
/// Transports call this with the request's cache hint before issuing the
/// round trip.
pub fn revalidation_headers(entry: &CacheEntry) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(etag) = &entry.etag {
        headers.insert(HEADER_IF_NONE_MATCH.to_string(), etag.clone());
    }
    if entry.last_modified > 0 {
        headers.insert(
            HEADER_IF_MODIFIED_SINCE.to_string(),
            format_http_date(entry.last_modified),
        );
    }
    headers
}

/// Format an epoch-millisecond stamp as an RFC 1123 HTTP date.
pub fn format_http_date(epoch_ms: i64) -> String {
    let date: DateTime<Utc> = Utc
        .timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH);
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header into epoch milliseconds. Returns `None` on
/// anything unparseable rather than guessing.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_date_round_trip() {
        let ms = 1_298_293_751_000; // second-aligned, as HTTP dates are
        let formatted = format_http_date(ms);
        assert_eq!(parse_http_date(&formatted), Some(ms));
    }

    #[test]
    fn parse_http_date_rejects_garbage() {
        assert_eq!(parse_http_date("not a date"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("ETag".to_string(), "\"abc\"".to_string());
        let response = NetworkResponse::new(200, Bytes::new(), headers);
        assert_eq!(response.header("etag"), Some("\"abc\""));
        assert_eq!(response.header("ETAG"), Some("\"abc\""));
        assert_eq!(response.header("Expires"), None);
    }

    #[test]
    fn revalidation_headers_from_entry() {
        let entry = CacheEntry {
            data: Bytes::from_static(b"x"),
            etag: Some("\"v1\"".to_string()),
            server_date: 0,
            last_modified: 1_298_293_751_000,
            ttl: 0,
            soft_ttl: 0,
            response_headers: HashMap::new(),
        };
        let headers = revalidation_headers(&entry);
        assert_eq!(headers.get(HEADER_IF_NONE_MATCH).map(String::as_str), Some("\"v1\""));
        assert!(headers.contains_key(HEADER_IF_MODIFIED_SINCE));
    }

    #[test]
    fn not_modified_merge_keeps_stale_body() {
        let mut stale_headers = HashMap::new();
        stale_headers.insert("Content-Type".to_string(), "text/plain".to_string());
        let entry = CacheEntry {
            data: Bytes::from_static(b"cached"),
            etag: None,
            server_date: 0,
            last_modified: 0,
            ttl: 0,
            soft_ttl: 0,
            response_headers: stale_headers,
        };
        let mut fresh = HashMap::new();
        fresh.insert("Date".to_string(), "Mon, 21 Feb 2011 12:29:11 GMT".to_string());
        let response = NetworkResponse::not_modified_from(&entry, fresh);
        assert!(response.not_modified);
        assert_eq!(&response.data[..], b"cached");
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert!(response.header("Date").is_some());
    }
}
