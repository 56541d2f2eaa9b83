//! Bounded TTL cache shared by geo resolution and routing decisions.
//!
//! Entries expire lazily on access. When the cache is full, expired entries are
//! swept first and the oldest remaining entry is evicted if that was not enough.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent cache with per-entry time-to-live and a capacity bound.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache. A capacity of zero is raised to one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a fresh entry.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up a fresh entry as of `now`.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let lookup = match self.entries.get(key) {
            Some(entry) if self.is_fresh(entry.inserted_at, now) => Some(Some(entry.value.clone())),
            Some(_) => Some(None),
            None => None,
        };

        match lookup {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(None) => {
                self.entries
                    .remove_if(key, |_, entry| !self.is_fresh(entry.inserted_at, now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Insert or replace an entry as of `now`.
    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired_at(now);
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    /// Remove an entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop every entry expired as of `now`.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| self.is_fresh(entry.inserted_at, now));
        before.saturating_sub(self.entries.len())
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cache hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Capacity evictions since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn is_fresh(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) < self.ttl
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 10);
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_lazy_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(10), 10);
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);

        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(9)), Some(1));
        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(10)), None);
        // Expired entry was dropped on access
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_sweeps_expired_first() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(10), 2);
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(8));

        // Entry 1 has expired by now; it goes, entry 2 survives.
        cache.insert_at(3, 3, t0 + Duration::from_secs(12));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(&2, t0 + Duration::from_secs(12)), Some(2));
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(1));
        cache.insert_at(3, 3, t0 + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(&1, t0 + Duration::from_secs(2)), None);
        assert_eq!(cache.get_at(&3, t0 + Duration::from_secs(2)), Some(3));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 1);
        cache.insert(1, 1);
        cache.insert(1, 2);
        assert_eq!(cache.get(&1), Some(2));
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(5), 10);
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(4));
        assert_eq!(cache.purge_expired_at(t0 + Duration::from_secs(6)), 1);
        assert_eq!(cache.len(), 1);
    }
}
