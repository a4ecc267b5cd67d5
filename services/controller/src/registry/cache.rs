//! Content cache with LRU eviction.
//!
//! Entries are keyed by content digest, so a hit is always byte-identical
//! to what a backend would return for a reference pinned to that digest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration for a content cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Maximum cache size in bytes.
    pub max_size_bytes: u64,
    /// High water mark that triggers eviction (fraction of max).
    pub high_water_mark: f64,
    /// Low water mark target after eviction (fraction of max).
    pub low_water_mark: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * 1024 * 1024, // 64 MiB
            high_water_mark: 0.9,
            low_water_mark: 0.7,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    data: Bytes,
    /// Access tick; larger is more recent.
    last_accessed: u64,
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub current_size_bytes: AtomicU64,
}

/// Digest-keyed byte cache shared by the backends of one artifact class.
pub struct ContentCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: AtomicU64,
    stats: CacheStats,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up content by digest.
    pub async fn get(&self, digest: &str) -> Option<Bytes> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(digest) {
            Some(entry) => {
                entry.last_accessed = self.tick();
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store content under its digest, evicting old entries if the high
    /// water mark is crossed.
    pub async fn insert(&self, digest: &str, data: Bytes) {
        let size = data.len() as u64;
        if size > self.config.max_size_bytes {
            debug!(digest = %digest, size, "Content larger than cache, not caching");
            return;
        }

        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(digest) {
                return;
            }
            entries.insert(
                digest.to_string(),
                CacheEntry {
                    data,
                    last_accessed: self.tick(),
                },
            );
            self.stats
                .current_size_bytes
                .fetch_add(size, Ordering::Relaxed);
        }
        debug!(digest = %digest, size, "Cached content");

        if self.needs_eviction() {
            self.evict().await;
        }
    }

    pub async fn contains(&self, digest: &str) -> bool {
        self.entries.read().await.contains_key(digest)
    }

    pub fn current_size(&self) -> u64 {
        self.stats.current_size_bytes.load(Ordering::Relaxed)
    }

    pub fn needs_eviction(&self) -> bool {
        let threshold = (self.config.max_size_bytes as f64 * self.config.high_water_mark) as u64;
        self.current_size() > threshold
    }

    /// Evict least recently used entries down to the low water mark.
    /// Returns the number of bytes freed.
    pub async fn evict(&self) -> u64 {
        let target = (self.config.max_size_bytes as f64 * self.config.low_water_mark) as u64;
        let mut entries = self.entries.write().await;

        let mut candidates: Vec<(String, u64)> = entries
            .iter()
            .map(|(digest, entry)| (digest.clone(), entry.last_accessed))
            .collect();
        candidates.sort_by_key(|(_, accessed)| *accessed);

        let mut freed = 0u64;
        for (digest, _) in candidates {
            if self.current_size() <= target {
                break;
            }
            if let Some(entry) = entries.remove(&digest) {
                let size = entry.data.len() as u64;
                self.stats
                    .current_size_bytes
                    .fetch_sub(size, Ordering::Relaxed);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                freed += size;
                info!(digest = %digest, size, "Evicted cached content");
            }
        }
        freed
    }

    /// Snapshot as (hits, misses, evictions, current size).
    pub fn stats(&self) -> (u64, u64, u64, u64) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
            self.stats.evictions.load(Ordering::Relaxed),
            self.stats.current_size_bytes.load(Ordering::Relaxed),
        )
    }
}
