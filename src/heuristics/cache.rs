// src/heuristics/cache.rs
//! Bounded scan result cache
//!
//! Eviction is FIFO by insertion: when full, the entry inserted first is
//! dropped, regardless of how recently it was read. Entries older than the
//! configured lifetime are treated as misses.

use crate::heuristics::scanner::AnalysisResult;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of cached URLs
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

struct CacheEntry {
    result: Arc<AnalysisResult>,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,

    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
}

/// URL -> analysis result, FIFO bounded
pub struct ScanCache {
    inner: Mutex<CacheInner>,
    capacity: usize,

    /// `None` disables expiry
    ttl: Option<Duration>,
}

impl ScanCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Cached result for `url`, dropping it if expired
    pub fn get(&self, url: &str) -> Option<Arc<AnalysisResult>> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(url) {
            None => return None,
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
        };

        if expired {
            debug!("Scan cache entry expired for {}", url);
            inner.entries.remove(url);
            inner.order.retain(|k| k != url);
            return None;
        }

        inner.entries.get(url).map(|e| Arc::clone(&e.result))
    }

    /// Insert a result, evicting the oldest-inserted entry when full.
    /// Replacing an existing key keeps its queue position.
    pub fn insert(&self, url: &str, result: Arc<AnalysisResult>) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if let Some(entry) = inner.entries.get_mut(url) {
            entry.result = result;
            entry.inserted_at = now;
            return;
        }

        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!("Evicted {} from scan cache", oldest);
        }

        inner.order.push_back(url.to_string());
        inner.entries.insert(
            url.to_string(),
            CacheEntry {
                result,
                inserted_at: now,
            },
        );
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, None)
    }
}
