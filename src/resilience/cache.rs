//! Shared namespaced TTL cache.
//!
//! One cache instance replaces the per-service maps: route responses, live
//! provider payloads and anything else that wants short-lived memoization
//! pick a namespace and share the same store. Process-local only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct TtlCache<V> {
    entries: DashMap<(String, String), Entry<V>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the value only if it has not outlived its TTL.
    pub fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let now = Instant::now();
        let found = self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Return the value and its age regardless of expiry.
    pub fn get_stale(&self, namespace: &str, key: &str) -> Option<(V, Duration)> {
        self.entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| (entry.value.clone(), entry.inserted_at.elapsed()))
    }

    pub fn set(&self, namespace: &str, key: &str, value: V) {
        self.set_with_ttl(namespace, key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, namespace: &str, key: &str, value: V, ttl: Duration) {
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, namespace: &str, key: &str) -> bool {
        self.entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some()
    }

    /// Drop every entry in `namespace`. Returns how many were removed.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(ns, _), _| ns != namespace);
        before.saturating_sub(self.entries.len())
    }

    /// Drop expired entries. Stale reads are no longer possible for them afterwards.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("routes", "teams:nba", 42);
        assert_eq!(cache.get("routes", "teams:nba"), Some(42));
        assert_eq!(cache.get("routes", "teams:nfl"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_entry_is_only_available_stale() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set_with_ttl("live", "basketball:games", "payload", Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get("live", "basketball:games"), None);
        let (value, age) = cache
            .get_stale("live", "basketball:games")
            .expect("stale entry should remain");
        assert_eq!(value, "payload");
        assert!(age >= Duration::from_millis(10));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("routes", "a", 1);
        cache.set("routes", "b", 2);
        cache.set("live", "a", 3);

        assert_eq!(cache.invalidate_namespace("routes"), 2);
        assert_eq!(cache.get("routes", "a"), None);
        assert_eq!(cache.get("live", "a"), Some(3));
    }

    #[test]
    fn test_invalidate_single_key() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("routes", "a", 1);
        assert!(cache.invalidate("routes", "a"));
        assert!(!cache.invalidate("routes", "a"));
    }

    #[test]
    fn test_purge_expired_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set_with_ttl("live", "old", 1, Duration::from_millis(5));
        cache.set("live", "new", 2);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get_stale("live", "old").is_none());
        assert_eq!(cache.get("live", "new"), Some(2));
    }
}
