//! Bounded memory of recently observed item keys

use lru::LruCache;

/// Insertion-ordered set of keys with a hard capacity.
///
/// Lookups never promote entries, so eviction order is oldest-inserted first.
/// When an insert pushes the size past `capacity`, the oldest keys are dropped
/// until the cache is back at `low_water` (half the capacity).
#[derive(Debug)]
pub struct DedupCache {
    entries: LruCache<String, ()>,
    capacity: usize,
    low_water: usize,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: LruCache::unbounded(),
            capacity,
            low_water: (capacity / 2).max(1),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert a key; returns false if it was already present
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains(&key) {
            return false;
        }
        self.entries.push(key, ());

        if self.entries.len() > self.capacity {
            let evicted = self.trim_to(self.low_water);
            tracing::debug!(
                evicted,
                remaining = self.entries.len(),
                "Dedup cache over capacity, evicted oldest keys"
            );
        }
        true
    }

    fn trim_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > target {
            if self.entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
