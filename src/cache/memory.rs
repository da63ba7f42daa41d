//! In-memory cache backend.

use dashmap::DashMap;

use crate::cache::entry::CacheEntry;
use crate::cache::Cache;
use crate::error::CacheError;

/// Unbounded in-memory store. The default cache when no directory is
/// configured, and the workhorse of the test suites.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn initialize(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str, full_expire: bool) -> Result<(), CacheError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if full_expire {
                entry.ttl = 0;
            }
            entry.soft_ttl = 0;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
