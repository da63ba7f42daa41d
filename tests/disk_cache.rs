//! Disk store behavior: persistence across instances, the on-disk entry
//! layout, LRU pruning, invalidation, and corrupt-file recovery.

use std::collections::HashMap;
use std::fs;

use bytes::Bytes;

use quiver::cache::entry::epoch_millis;
use quiver::prelude::*;

fn entry(body: &[u8]) -> CacheEntry {
    let now = epoch_millis();
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "text/plain".to_string());
    CacheEntry {
        data: Bytes::copy_from_slice(body),
        etag: Some("\"tag\"".to_string()),
        server_date: now,
        last_modified: now - 1_000,
        ttl: now + 60_000,
        soft_ttl: now + 30_000,
        response_headers: headers,
    }
}

fn bare_entry(body: &[u8]) -> CacheEntry {
    CacheEntry {
        data: Bytes::copy_from_slice(body),
        etag: None,
        server_date: 0,
        last_modified: 0,
        ttl: 0,
        soft_ttl: 0,
        response_headers: HashMap::new(),
    }
}

#[test]
fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();

    let stored = entry(b"hello");
    cache.put("http://test/a", stored.clone()).unwrap();
    let loaded = cache.get("http://test/a").unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(cache.get("http://test/missing").unwrap(), None);
}

#[test]
fn entries_survive_a_new_instance() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = DiskCache::new(dir.path());
        cache.initialize().unwrap();
        cache.put("http://test/a", entry(b"alpha")).unwrap();
        cache.put("http://test/b", entry(b"beta")).unwrap();
    }

    let reopened = DiskCache::new(dir.path());
    reopened.initialize().unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(&reopened.get("http://test/a").unwrap().unwrap().data[..], b"alpha");
    assert_eq!(&reopened.get("http://test/b").unwrap().unwrap().data[..], b"beta");
}

#[test]
fn on_disk_layout_starts_with_the_little_endian_magic() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();
    cache.put("k", entry(b"x")).unwrap();

    let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let raw = fs::read(files[0].as_ref().unwrap().path()).unwrap();
    // 0x20150306 little-endian.
    assert_eq!(&raw[0..4], &[0x06, 0x03, 0x15, 0x20]);
    // The raw body sits at the very end of the file.
    assert_eq!(&raw[raw.len() - 1..], b"x");
}

#[test]
fn corrupt_files_are_dropped_on_initialize() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = DiskCache::new(dir.path());
        cache.initialize().unwrap();
        cache.put("http://test/good", entry(b"good")).unwrap();
    }
    fs::write(dir.path().join("not-an-entry"), b"garbage").unwrap();

    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();
    assert_eq!(cache.len(), 1);
    assert!(!dir.path().join("not-an-entry").exists());
    assert!(cache.get("http://test/good").unwrap().is_some());
}

#[test]
fn lru_pruning_evicts_the_least_recently_used_entry() {
    // Each bare entry with a one-byte key and a 200 byte body encodes to
    // 257 bytes; a 600 byte budget holds two of them.
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path()).with_max_bytes(600);
    cache.initialize().unwrap();

    let body = vec![0u8; 200];
    cache.put("a", bare_entry(&body)).unwrap();
    cache.put("b", bare_entry(&body)).unwrap();
    // Touch "a" so "b" becomes the eviction candidate.
    assert!(cache.get("a").unwrap().is_some());
    cache.put("c", bare_entry(&body)).unwrap();

    assert!(cache.get("a").unwrap().is_some());
    assert_eq!(cache.get("b").unwrap(), None, "LRU entry must be evicted");
    assert!(cache.get("c").unwrap().is_some());
    assert!(cache.total_bytes() <= 600);
}

#[test]
fn soft_invalidate_forces_refresh_but_not_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();
    cache.put("http://test/a", entry(b"hello")).unwrap();

    cache.invalidate("http://test/a", false).unwrap();
    let invalidated = cache.get("http://test/a").unwrap().unwrap();
    assert!(invalidated.refresh_needed());
    assert!(!invalidated.is_expired());
    assert_eq!(&invalidated.data[..], b"hello");
}

#[test]
fn full_invalidate_expires_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();
    cache.put("http://test/a", entry(b"hello")).unwrap();

    cache.invalidate("http://test/a", true).unwrap();
    let invalidated = cache.get("http://test/a").unwrap().unwrap();
    assert!(invalidated.is_expired());
    // The body and validators survive for the revalidation round trip.
    assert_eq!(invalidated.etag.as_deref(), Some("\"tag\""));
}

#[test]
fn remove_and_clear_delete_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(dir.path());
    cache.initialize().unwrap();
    cache.put("a", entry(b"1")).unwrap();
    cache.put("b", entry(b"2")).unwrap();

    cache.remove("a").unwrap();
    assert_eq!(cache.get("a").unwrap(), None);
    assert_eq!(cache.len(), 1);

    cache.clear().unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.total_bytes(), 0);
    let remaining = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(remaining, 0);
}

#[test]
fn a_disk_backed_queue_serves_hits_across_restarts() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use quiver::net::format_http_date;
    use quiver::request::erased::ErasedRequest;

    struct CountingNetwork {
        calls: AtomicUsize,
    }

    impl Network for CountingNetwork {
        fn perform_request(
            &self,
            _request: &dyn ErasedRequest,
        ) -> Result<NetworkResponse, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut headers = HashMap::new();
            headers.insert("Date".to_string(), format_http_date(epoch_millis()));
            headers.insert("Cache-Control".to_string(), "max-age=60".to_string());
            Ok(NetworkResponse::new(200, Bytes::from_static(b"payload"), headers))
        }
    }

    fn wait_finished(handle: &RequestHandle) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "request did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let network = Arc::new(CountingNetwork { calls: AtomicUsize::new(0) });

    let parser = |response: &NetworkResponse| {
        String::from_utf8(response.data.to_vec()).map_err(|e| RequestError::parse(e.to_string()))
    };

    {
        let queue = RequestQueue::builder()
            .network(network.clone())
            .cache_dir(dir.path())
            .build()
            .unwrap();
        queue.start().unwrap();
        let handle = queue.add(Request::get("http://test/persist", parser).build());
        wait_finished(&handle);
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    // A fresh queue over the same directory answers from disk.
    let queue = RequestQueue::builder()
        .network(network.clone())
        .cache_dir(dir.path())
        .build()
        .unwrap();
    queue.start().unwrap();
    let handle = queue.add(Request::get("http://test/persist", parser).build());
    wait_finished(&handle);
    assert_eq!(network.calls.load(Ordering::SeqCst), 1, "second run is a disk hit");
    assert!(handle
        .markers()
        .iter()
        .any(|marker| marker.name == "cache-hit"));
}
