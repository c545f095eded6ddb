//! In-memory LRU tier (§4.4 "Hot tier"). Insertion-ordered with
//! explicit move-to-back on every access, capacity `maxCategories`
//! (default 3).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::CacheEntry;

pub struct HotCache<T: Clone> {
    inner: Mutex<LruCache<String, CacheEntry<T>>>,
}

impl<T: Clone> HotCache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let mut guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.get(key).cloned()
    }

    /// Inserts `entry`, returning the evicted entry's key if capacity
    /// forced an eviction.
    pub fn set(&self, key: String, entry: CacheEntry<T>) -> Option<String> {
        let mut guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.push(key, entry).map(|(evicted_key, _)| evicted_key)
    }

    pub fn has(&self, key: &str) -> bool {
        let guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.contains(key)
    }

    pub fn invalidate(&self, key: &str) {
        let mut guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.pop(key);
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let guard = self.inner.lock().expect("hot cache mutex poisoned");
        guard.iter().map(|(k, _)| k.clone()).collect()
    }
}
