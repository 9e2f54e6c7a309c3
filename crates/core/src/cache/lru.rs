//! Bounded, thread-safe LRU cache with pluggable size accounting.
//!
//! Capacity is measured in "size units" reported by a sizer closure (1 per entry
//! by default, bytes for the content store). When an insert would exceed capacity
//! the least recently used entries are evicted one at a time, each passed to the
//! eviction listener before it is dropped. Listeners run after the internal lock is
//! released, so they may call back into the cache.

use parking_lot::Mutex;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reports the size of a value in capacity units.
pub type Sizer<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;
/// Invoked with each entry evicted for capacity.
pub type EvictionListener<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// Point-in-time cache counters. Counts may lag slightly under concurrent use.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Number of entries.
    pub size: usize,
    /// Sum of entry sizes in capacity units.
    pub total_size: usize,
    pub capacity: usize,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_ratio: f64,
}

struct Inner<K: Hash + Eq, V> {
    entries: ::lru::LruCache<K, (V, usize)>,
    total_size: usize,
}

pub struct LruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    sizer: Sizer<V>,
    on_evict: Option<EvictionListener<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V: Clone + 'static> LruCache<K, V> {
    /// A cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::with_sizer(capacity, Box::new(|_: &V| 1))
    }

    /// A cache bounded by the summed `sizer` output instead of entry count.
    pub fn with_sizer(capacity: usize, sizer: Sizer<V>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: ::lru::LruCache::unbounded(),
                total_size: 0,
            }),
            capacity,
            sizer,
            on_evict: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Registers the eviction listener.
    pub fn on_evict(mut self, listener: EvictionListener<K, V>) -> Self {
        self.on_evict = Some(listener);
        self
    }

    /// Returns a clone of the value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.inner.lock().entries.get(key).map(|(v, _)| v.clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Like [`LruCache::get`] but leaves recency and counters untouched.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.peek(key).map(|(v, _)| v.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Inserts or replaces `key`, evicting least recently used entries until the
    /// new total fits. Returns `false` (and stores nothing) if the value alone is
    /// larger than the whole capacity.
    pub fn set(&self, key: K, value: V) -> bool {
        let size = (self.sizer)(&value);
        if size > self.capacity {
            tracing::debug!(
                size,
                capacity = self.capacity,
                "cache entry larger than capacity, not cached"
            );
            return false;
        }

        let mut evicted: Vec<(K, V)> = Vec::new();
        {
            let mut inner = self.inner.lock();
            if let Some((_, old_size)) = inner.entries.pop(&key) {
                inner.total_size -= old_size;
            }
            while inner.total_size + size > self.capacity {
                match inner.entries.pop_lru() {
                    Some((k, (v, s))) => {
                        inner.total_size -= s;
                        evicted.push((k, v));
                    }
                    None => break,
                }
            }
            inner.entries.put(key, (value, size));
            inner.total_size += size;
        }

        if !evicted.is_empty() {
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            tracing::debug!(count = evicted.len(), "cache evicted entries");
            if let Some(listener) = &self.on_evict {
                for (k, v) in &evicted {
                    listener(k, v);
                }
            }
        }
        true
    }

    /// Removes `key` without invoking the eviction listener.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let (v, s) = inner.entries.pop(key)?;
        inner.total_size -= s;
        Some(v)
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_size = 0;
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

    /// Entries from most to least recently used, without touching recency.
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
    {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let (size, total_size) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.total_size)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            total_size,
            capacity: self.capacity,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.inner.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_evicts_first_inserted() {
        let cache: LruCache<&str, u32> = LruCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.set("d", 4);
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache: LruCache<&str, u32> = LruCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("d", 4);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let cache: LruCache<&str, u32> = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.peek(&"a"), Some(1));
        cache.set("c", 3);
        assert!(!cache.contains(&"a"));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_stats_hit_ratio() {
        let cache: LruCache<u32, u32> = LruCache::new(4);
        assert_eq!(cache.stats().hit_ratio, 0.0);
        cache.set(1, 10);
        cache.get(&1);
        cache.get(&1);
        cache.get(&1);
        cache.get(&2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_eviction_listener_sees_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Box::new(move |k: &u32, v: &String| {
            sink.lock().push((*k, v.clone()));
        });
        let cache: LruCache<u32, String> = LruCache::new(1).on_evict(listener);
        cache.set(1, "one".into());
        cache.set(2, "two".into());
        assert_eq!(*seen.lock(), vec![(1, "one".to_string())]);
    }

    #[test]
    fn test_sized_capacity() {
        let cache: LruCache<u32, String> = LruCache::with_sizer(10, Box::new(|s: &String| s.len()));
        assert!(cache.set(1, "abcd".into()));
        assert!(cache.set(2, "efgh".into()));
        assert!(cache.set(3, "ijkl".into()));
        assert!(!cache.contains(&1));
        assert_eq!(cache.stats().total_size, 8);
        assert!(!cache.set(4, "x".repeat(11)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replace_updates_size() {
        let cache: LruCache<u32, String> = LruCache::with_sizer(10, Box::new(|s: &String| s.len()));
        cache.set(1, "abcdef".into());
        cache.set(1, "ab".into());
        assert_eq!(cache.stats().total_size, 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.remove(&1), Some("ab".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access_keeps_mapping() {
        let cache = Arc::new(LruCache::<u32, u32>::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        let key = (i * 7 + t) % 100;
                        cache.set(key, key * 2);
                        if let Some(v) = cache.get(&key) {
                            assert_eq!(v, key * 2);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 64);
        for (k, v) in cache.entries() {
            assert_eq!(v, k * 2);
        }
    }
}
