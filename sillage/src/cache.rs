//! Time-bounded result cache.
//!
//! Keys are full strings in two namespaces (`search:` and `autocomplete:`).
//! Entries expire after their TTL; a background sweeper drops expired entries
//! on a fixed interval, and the least recently used entry is evicted when the
//! cache is full.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::interface::{CacheStats, ResolvedOptions, SearchResponse};

/// Cached payloads. Search and autocomplete share one store.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Search(SearchResponse),
    Autocomplete(Vec<String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

pub struct ResultCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `"search:" + query + ":" + JSON(options)`.
    pub fn search_key(normalized_query: &str, options: &ResolvedOptions) -> String {
        let options = serde_json::to_string(options).unwrap_or_default();
        format!("search:{normalized_query}:{options}")
    }

    pub fn autocomplete_key(normalized_query: &str, limit: usize) -> String {
        format!("autocomplete:{normalized_query}:{limit}")
    }

    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = Instant::now();

        // LRU lookups update recency, so reads take the write lock.
        let mut entries = self.entries.write();
        let found = entries.get(key).map(|e| (!e.is_expired(now)).then(|| e.value.clone()));

        match found {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit");
                Some(value)
            }
            Some(None) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache miss");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: CachedValue) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: CachedValue, ttl: Duration) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        if let Some((evicted, _)) = self.entries.write().push(key.to_string(), entry) {
            if evicted != key {
                debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn flush(&self) {
        self.entries.write().clear();
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.entries.read().len(),
        }
    }

    /// Sweep on a fixed interval until `token` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
