//! Concurrent FIFO-evicting compiled-pattern cache (spec §5), grounded on the
//! `Arc<DashMap<...>>` handle pattern used throughout axiom's intrinsics
//! table for lock-free-read shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use super::Regex;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Caches compiled `Regex` values by source pattern. Reads that hit are
/// lock-free; a miss takes the FIFO-order lock just long enough to insert
/// and possibly evict the oldest entry.
pub struct RegexCache {
    capacity: usize,
    entries: DashMap<String, Arc<Regex>>,
    order: Mutex<std::collections::VecDeque<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        RegexCache {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            order: Mutex::new(std::collections::VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the compiled regex for `pattern`, building and inserting it
    /// on a cache miss.
    pub fn get(&self, pattern: &str) -> Arc<Regex> {
        if let Some(hit) = self.entries.get(pattern) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(&hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let built = Arc::new(Regex::compile(pattern));

        // Re-check under the FIFO lock: another thread may have inserted
        // the same pattern while this one was compiling.
        let mut order = self.order.lock();
        if let Some(existing) = self.entries.get(pattern) {
            return Arc::clone(&existing);
        }
        self.entries.insert(pattern.to_string(), Arc::clone(&built));
        order.push_back(pattern.to_string());
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                warn!(pattern = oldest.as_str(), "evicting regex cache entry");
            }
        }
        built
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_and_misses_are_counted() {
        let cache = RegexCache::new(10);
        let _ = cache.get("a+");
        let _ = cache.get("a+");
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let cache = RegexCache::new(2);
        let _ = cache.get("a+");
        let _ = cache.get("b+");
        let _ = cache.get("c+");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }
}
