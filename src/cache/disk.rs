//! Disk-backed cache with a byte-budgeted LRU policy.
//!
//! One file per entry under a root directory, named by the SHA-256 of the
//! cache key. An in-memory index of entry headers is rebuilt by
//! `initialize` so lookups never scan the directory. All operations take
//! the index lock for their full duration, file I/O included, which keeps
//! concurrent `get`/`put` from the cache and network dispatchers simple
//! and correct.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::cache::codec;
use crate::cache::entry::CacheEntry;
use crate::cache::Cache;
use crate::error::CacheError;

/// Default byte budget: 5 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Pruning drains the store to this fraction of the budget so every put
/// does not immediately re-trigger a prune.
const HYSTERESIS_FACTOR: f32 = 0.9;

/// Disk-backed [`Cache`] implementation.
pub struct DiskCache {
    root: PathBuf,
    max_bytes: u64,
    state: Mutex<IndexState>,
}

#[derive(Default)]
struct IndexState {
    entries: HashMap<String, IndexEntry>,
    total_bytes: u64,
    access_clock: u64,
}

struct IndexEntry {
    size: u64,
    last_access: u64,
}

impl DiskCache {
    /// Cache rooted at `root` with the default byte budget.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            state: Mutex::new(IndexState::default()),
        }
    }

    /// Override the byte budget.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Bytes currently accounted to stored entries.
    pub fn total_bytes(&self) -> u64 {
        self.lock_state().total_bytes
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, IndexState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{digest:x}"))
    }

    fn touch(state: &mut IndexState, key: &str) {
        state.access_clock += 1;
        let clock = state.access_clock;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = clock;
        }
    }

    fn drop_entry(&self, state: &mut IndexState, key: &str, path: &Path) {
        if let Some(old) = state.entries.remove(key) {
            state.total_bytes = state.total_bytes.saturating_sub(old.size);
        }
        if let Err(err) = fs::remove_file(path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("failed to remove cache file {}: {}", path.display(), err);
        }
    }

    /// Evict least-recently-used entries until `needed` more bytes fit
    /// inside the hysteresis-adjusted budget.
    fn prune_if_needed(&self, state: &mut IndexState, needed: u64) {
        if state.total_bytes + needed <= self.max_bytes {
            return;
        }
        let watermark = (self.max_bytes as f32 * HYSTERESIS_FACTOR) as u64;
        let mut victims: Vec<(String, u64)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_access))
            .collect();
        victims.sort_by_key(|(_, last_access)| *last_access);

        let before = state.entries.len();
        for (key, _) in victims {
            if state.total_bytes + needed <= watermark {
                break;
            }
            let path = self.file_path(&key);
            self.drop_entry(state, &key, &path);
        }
        log::debug!(
            "pruned {} cache entries, {} bytes in use",
            before - state.entries.len(),
            state.total_bytes
        );
    }
}

impl Cache for DiskCache {
    fn initialize(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)?;
        let mut state = self.lock_state();
        state.entries.clear();
        state.total_bytes = 0;

        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let size = dir_entry.metadata().map(|m| m.len()).unwrap_or(0);
            let parsed = File::open(&path)
                .map_err(CacheError::from)
                .and_then(|file| {
                    codec::read_header(&mut BufReader::new(file))
                        .map_err(|e| CacheError::corrupt(e.to_string()))
                });
            match parsed {
                Ok((key, _)) => {
                    state.access_clock += 1;
                    let last_access = state.access_clock;
                    state.entries.insert(key, IndexEntry { size, last_access });
                    state.total_bytes += size;
                }
                Err(err) => {
                    log::warn!("dropping unreadable cache file {}: {}", path.display(), err);
                    let _ = fs::remove_file(&path);
                }
            }
        }
        log::debug!(
            "cache initialized: {} entries, {} bytes",
            state.entries.len(),
            state.total_bytes
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut state = self.lock_state();
        if !state.entries.contains_key(key) {
            return Ok(None);
        }
        let path = self.file_path(key);
        let read = File::open(&path)
            .map_err(CacheError::from)
            .and_then(|file| {
                codec::read_entry(&mut BufReader::new(file))
                    .map_err(|e| CacheError::corrupt(e.to_string()))
            });
        match read {
            Ok((stored_key, entry)) if stored_key == key => {
                Self::touch(&mut state, key);
                Ok(Some(entry))
            }
            Ok((stored_key, _)) => {
                log::warn!("cache file for {key} holds key {stored_key}, dropping");
                self.drop_entry(&mut state, key, &path);
                Ok(None)
            }
            Err(err) => {
                log::warn!("failed to read cache entry for {key}: {err}");
                self.drop_entry(&mut state, key, &path);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut blob = Vec::with_capacity(entry.data.len() + 256);
        codec::write_entry(&mut blob, key, &entry).map_err(|e| CacheError::io(e.to_string()))?;
        let size = blob.len() as u64;

        fs::create_dir_all(&self.root)?;
        let mut state = self.lock_state();
        self.prune_if_needed(&mut state, size);

        let path = self.file_path(key);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        std::io::Write::write_all(&mut writer, &blob)?;
        std::io::Write::flush(&mut writer)?;

        if let Some(old) = state.entries.remove(key) {
            state.total_bytes = state.total_bytes.saturating_sub(old.size);
        }
        state.access_clock += 1;
        let last_access = state.access_clock;
        state.entries.insert(key.to_string(), IndexEntry { size, last_access });
        state.total_bytes += size;
        Ok(())
    }

    fn invalidate(&self, key: &str, full_expire: bool) -> Result<(), CacheError> {
        let mut state = self.lock_state();
        if !state.entries.contains_key(key) {
            return Ok(());
        }
        let path = self.file_path(key);
        let file = File::open(&path)?;
        let (stored_key, mut entry) = codec::read_entry(&mut BufReader::new(file))
            .map_err(|e| CacheError::corrupt(e.to_string()))?;
        if full_expire {
            entry.ttl = 0;
        }
        entry.soft_ttl = 0;

        let mut blob = Vec::with_capacity(entry.data.len() + 256);
        codec::write_entry(&mut blob, &stored_key, &entry)
            .map_err(|e| CacheError::io(e.to_string()))?;
        fs::write(&path, &blob)?;

        let size = blob.len() as u64;
        let previous = state.entries.get_mut(key).map(|indexed| {
            let old = indexed.size;
            indexed.size = size;
            old
        });
        if let Some(old) = previous {
            state.total_bytes = state.total_bytes.saturating_sub(old) + size;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.lock_state();
        let path = self.file_path(key);
        self.drop_entry(&mut state, key, &path);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.lock_state();
        let keys: Vec<String> = state.entries.keys().cloned().collect();
        for key in keys {
            let path = self.file_path(&key);
            self.drop_entry(&mut state, &key, &path);
        }
        state.total_bytes = 0;
        Ok(())
    }
}
