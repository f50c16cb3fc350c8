//! Strict LRU cache with hit/miss accounting

use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded LRU map; capacity 0 stores nothing and every lookup misses
#[derive(Debug)]
pub struct BoundedCache<K: Hash + Eq, V> {
    inner: Option<LruCache<K, V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.cap().get())
    }

    /// Whether the cache stores anything at all
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Resident entries
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.len())
    }

    /// Whether no entry is resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups that found an entry
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that found nothing
    pub const fn misses(&self) -> u64 {
        self.misses
    }

    /// Entries pushed out by inserts
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Fraction of lookups that hit
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Whether `key` is resident, without touching recency or counters
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.as_ref().map_or(false, |c| c.contains(key))
    }

    /// Look up `key`, marking it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let found = self.inner.as_mut().and_then(|c| c.get(key));
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Insert an entry
    ///
    /// Returns the entry that is no longer resident because of this insert:
    /// the least recently used one when full, a replaced value for the same
    /// key, or the new entry itself when the cache is disabled.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let displaced = match self.inner.as_mut() {
            Some(cache) => cache.push(key, value),
            None => Some((key, value)),
        };
        if displaced.is_some() && self.is_enabled() {
            self.evictions += 1;
        }
        displaced
    }

    /// Remove every entry, least recently used first
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.len());
        if let Some(cache) = self.inner.as_mut() {
            while let Some(entry) = cache.pop_lru() {
                out.push(entry);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = BoundedCache::new(2);
        assert!(cache.insert("a", 1).is_none());
        assert!(cache.insert("b", 2).is_none());

        // touch a so b becomes the eviction candidate
        assert_eq!(cache.get(&"a"), Some(&1));

        assert_eq!(cache.insert("c", 3), Some(("b", 2)));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_capacity_plus_one_leaves_capacity_resident() {
        for capacity in 1..=8 {
            let mut cache = BoundedCache::new(capacity);
            let evicted: Vec<_> = (0..=capacity)
                .filter_map(|i| cache.insert(i, i * 10))
                .collect();
            assert_eq!(cache.len(), capacity);
            assert_eq!(evicted, vec![(0, 0)]);
        }
    }

    #[test]
    fn test_zero_capacity_never_hits() {
        let mut cache = BoundedCache::new(0);
        for _ in 0..5 {
            assert!(cache.get(&"q").is_none());
            assert_eq!(cache.insert("q", 1), Some(("q", 1)));
        }
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 5);
        assert_eq!(cache.evictions(), 0);
        assert!(!cache.is_enabled());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let mut cache = BoundedCache::new(4);
        cache.insert(1, ());
        cache.get(&1);
        cache.get(&1);
        cache.get(&2);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_drain_empties_cache() {
        let mut cache = BoundedCache::new(3);
        cache.insert(1, 'a');
        cache.insert(2, 'b');
        cache.get(&1);
        assert_eq!(cache.drain(), vec![(2, 'b'), (1, 'a')]);
        assert!(cache.is_empty());
    }
}
