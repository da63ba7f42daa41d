//! Derives cache entries from HTTP response headers.
//!
//! Implements the freshness subset the dispatch engine relies on: `Date`,
//! `Last-Modified`, `ETag`, `Expires` and the `Cache-Control` tokens
//! `no-cache`, `no-store`, `max-age`, `stale-while-revalidate`,
//! `must-revalidate`/`proxy-revalidate`. Anything beyond that is the
//! transport's business.

use crate::cache::entry::{CacheEntry, epoch_millis};
use crate::net::{NetworkResponse, parse_http_date};

/// Build a cache entry from a network response, or `None` when the
/// response forbids caching.
///
/// `Cache-Control` arithmetic takes precedence over `Expires`. The
/// freshness base is the server `Date`, falling back to the local clock
/// when the header is absent or unparseable. `must-revalidate` collapses
/// the stale-while-revalidate window.
pub fn parse_cache_headers(response: &NetworkResponse) -> Option<CacheEntry> {
    let now = epoch_millis();

    let server_date = response
        .header("Date")
        .and_then(parse_http_date)
        .unwrap_or(0);
    let last_modified = response
        .header("Last-Modified")
        .and_then(parse_http_date)
        .unwrap_or(0);
    let etag = response.header("ETag").map(str::to_string);
    let server_expires = response.header("Expires").and_then(parse_http_date);

    let mut has_cache_control = false;
    let mut max_age: i64 = 0;
    let mut stale_while_revalidate: i64 = 0;
    let mut must_revalidate = false;

    if let Some(cache_control) = response.header("Cache-Control") {
        has_cache_control = true;
        for token in cache_control.split(',').map(str::trim) {
            if token.eq_ignore_ascii_case("no-cache") || token.eq_ignore_ascii_case("no-store") {
                return None;
            } else if let Some(value) = token.strip_prefix("max-age=") {
                max_age = value.parse().unwrap_or(0);
            } else if let Some(value) = token.strip_prefix("stale-while-revalidate=") {
                stale_while_revalidate = value.parse().unwrap_or(0);
            } else if token.eq_ignore_ascii_case("must-revalidate")
                || token.eq_ignore_ascii_case("proxy-revalidate")
            {
                must_revalidate = true;
            }
        }
    }

    let base = if server_date > 0 { server_date } else { now };
    let (soft_ttl, ttl) = if has_cache_control {
        let soft = base + max_age * 1000;
        let hard = if must_revalidate { soft } else { soft + stale_while_revalidate * 1000 };
        (soft, hard)
    } else if let Some(expires) = server_expires {
        (expires, expires)
    } else {
        // No freshness information: cache as immediately stale so the
        // entry is still usable for ETag/Last-Modified revalidation.
        (0, 0)
    };

    Some(CacheEntry {
        data: response.data.clone(),
        etag,
        server_date,
        last_modified,
        ttl,
        soft_ttl,
        response_headers: response.headers.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use super::*;
    use crate::net::format_http_date;

    fn response(headers: &[(&str, &str)]) -> NetworkResponse {
        let map: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NetworkResponse::new(200, Bytes::from_static(b"body"), map)
    }

    #[test]
    fn max_age_sets_both_ttls() {
        let date = 1_700_000_000_000;
        let r = response(&[
            ("Date", &format_http_date(date)),
            ("Cache-Control", "max-age=60"),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.soft_ttl, date + 60_000);
        assert_eq!(entry.ttl, date + 60_000);
        assert_eq!(entry.server_date, date);
    }

    #[test]
    fn stale_while_revalidate_extends_hard_ttl() {
        let date = 1_700_000_000_000;
        let r = response(&[
            ("Date", &format_http_date(date)),
            ("Cache-Control", "max-age=60, stale-while-revalidate=30"),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.soft_ttl, date + 60_000);
        assert_eq!(entry.ttl, date + 90_000);
    }

    #[test]
    fn must_revalidate_collapses_stale_window() {
        let date = 1_700_000_000_000;
        let r = response(&[
            ("Date", &format_http_date(date)),
            ("Cache-Control", "max-age=60, stale-while-revalidate=30, must-revalidate"),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.ttl, entry.soft_ttl);
    }

    #[test]
    fn cache_control_wins_over_expires() {
        let date = 1_700_000_000_000;
        let r = response(&[
            ("Date", &format_http_date(date)),
            ("Expires", &format_http_date(date + 3_600_000)),
            ("Cache-Control", "max-age=60"),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.ttl, date + 60_000);
    }

    #[test]
    fn expires_alone_sets_both_ttls() {
        let date = 1_700_000_000_000;
        let expires = date + 120_000;
        let r = response(&[
            ("Date", &format_http_date(date)),
            ("Expires", &format_http_date(expires)),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.ttl, expires);
        assert_eq!(entry.soft_ttl, expires);
    }

    #[test]
    fn no_cache_and_no_store_forbid_caching() {
        for directive in ["no-cache", "no-store", "max-age=60, no-store"] {
            let r = response(&[("Cache-Control", directive)]);
            assert!(parse_cache_headers(&r).is_none(), "{directive}");
        }
    }

    #[test]
    fn validators_survive_without_freshness() {
        let r = response(&[
            ("ETag", "\"v1\""),
            ("Last-Modified", "Mon, 21 Feb 2011 12:29:11 GMT"),
        ]);
        let entry = parse_cache_headers(&r).unwrap();
        assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
        assert!(entry.last_modified > 0);
        assert_eq!(entry.ttl, 0);
        assert!(entry.is_expired());
    }
}
