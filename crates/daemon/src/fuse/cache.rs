//! Whole-file content cache for FUSE reads
//!
//! Content is cached per path the first time a path is read and served from
//! memory afterwards. Nothing expires on its own; the whole cache is dropped
//! whenever the path index is rebuilt, so an entry never outlives the index
//! generation it was fetched under.
//!
//! By default the cache is unbounded for the lifetime of the mount. Setting a
//! byte capacity switches on size-weighted LRU eviction.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

/// Path-keyed cache of file contents
pub struct ContentCache {
    content: Cache<String, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    max_bytes: Option<u64>,
}

impl ContentCache {
    /// Create a cache. `max_bytes = None` keeps every entry until the next
    /// invalidation.
    pub fn new(max_bytes: Option<u64>) -> Self {
        let mut builder = Cache::builder();
        if let Some(max_bytes) = max_bytes {
            builder = builder
                .weigher(|_path: &String, data: &Bytes| -> u32 {
                    u32::try_from(data.len()).unwrap_or(u32::MAX)
                })
                .max_capacity(max_bytes);
        }

        Self {
            content: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_bytes,
        }
    }

    /// Get cached content for a path, counting the hit or miss
    pub fn get(&self, path: &str) -> Option<Bytes> {
        let found = self.content.get(path);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Length of the cached content, without touching hit statistics
    pub fn cached_len(&self, path: &str) -> Option<u64> {
        self.content.get(path).map(|data| data.len() as u64)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.content.contains_key(path)
    }

    /// Cache content for a path
    pub fn put(&self, path: &str, data: Bytes) {
        self.content.insert(path.to_string(), data);
    }

    /// Drop the cached content of one path
    pub fn invalidate(&self, path: &str) {
        self.content.invalidate(path);
    }

    /// Drop every cached entry
    pub fn invalidate_all(&self) {
        self.content.invalidate_all();
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.content.run_pending_tasks();
        CacheStats {
            entry_count: self.content.entry_count(),
            weighted_size: self.content.weighted_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            max_bytes: self.max_bytes,
        }
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("max_bytes", &self.max_bytes)
            .field("entry_count", &self.content.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    /// Total cached bytes when bounded, entry count otherwise
    pub weighted_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub max_bytes: Option<u64>,
}
