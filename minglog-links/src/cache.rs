//! Bounded FIFO adjacency cache keyed by `module:id`.
//!
//! Eviction only affects hit rate: every miss goes back to the store.
//! Mutations invalidate exactly the keys they touch, and bump a generation
//! counter so a read that overlapped a mutation does not repopulate a
//! stale entry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::models::ItemLinks;

#[derive(Debug)]
pub struct AdjacencyCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, ItemLinks>,
    order: VecDeque<String>,
    generation: u64,
}

impl AdjacencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<ItemLinks> {
        self.lock().entries.get(key).cloned()
    }

    /// Snapshot of the invalidation counter, taken before a store read.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert unless any invalidation happened since `generation` was read.
    pub fn insert_if_current(&self, key: String, links: ItemLinks, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(key = %key, "skipping cache fill after concurrent invalidation");
            return false;
        }
        if inner.entries.insert(key.clone(), links).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        true
    }

    pub fn invalidate<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        for key in keys {
            if inner.entries.remove(key).is_some() {
                inner.order.retain(|existing| existing != key);
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(cache: &AdjacencyCache, key: &str) {
        let generation = cache.generation();
        assert!(cache.insert_if_current(key.to_string(), ItemLinks::default(), generation));
    }

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let cache = AdjacencyCache::new(2);
        fill(&cache, "notes:a");
        fill(&cache, "notes:b");
        // Reads do not refresh position (FIFO, not LRU).
        assert!(cache.get("notes:a").is_some());
        fill(&cache, "notes:c");

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("notes:a"));
        assert!(cache.contains("notes:b"));
        assert!(cache.contains("notes:c"));
    }

    #[test]
    fn invalidate_removes_only_named_keys() {
        let cache = AdjacencyCache::new(8);
        fill(&cache, "notes:a");
        fill(&cache, "tasks:b");
        cache.invalidate(["notes:a"]);

        assert!(!cache.contains("notes:a"));
        assert!(cache.contains("tasks:b"));
    }

    #[test]
    fn stale_fill_is_rejected() {
        let cache = AdjacencyCache::new(8);
        let generation = cache.generation();
        cache.invalidate(["notes:a"]);

        assert!(!cache.insert_if_current("notes:a".to_string(), ItemLinks::default(), generation));
        assert!(cache.is_empty());
    }

    #[test]
    fn reinserted_key_keeps_single_queue_slot() {
        let cache = AdjacencyCache::new(2);
        fill(&cache, "notes:a");
        cache.invalidate(["notes:a"]);
        fill(&cache, "notes:a");
        fill(&cache, "notes:b");
        fill(&cache, "notes:c");

        assert!(!cache.contains("notes:a"));
        assert_eq!(cache.len(), 2);
    }
}
