//! TTL key/value cache.
//!
//! Backs the embedding cache and the rate limiter. [`CacheStore`] keeps the
//! store injectable so tests can supply fakes; [`InMemoryCache`] is the
//! process-local default over a concurrent map.

use chrono::Utc;
use dashmap::DashMap;

/// Keyed TTL store with atomic counter support.
///
/// The cache is advisory for values: concurrent misses for the same key may
/// race and both recompute. Counters are different — [`CacheStore::increment`]
/// must be atomic because the rate limiter's check-and-increment depends on it.
pub trait CacheStore: Send + Sync {
    /// Get a live (non-expired) value
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value with an optional TTL in seconds. `None` never expires.
    fn put(&self, key: &str, value: String, ttl_secs: Option<i64>);

    /// Atomically add `by` to a numeric entry and return the new total.
    ///
    /// A missing or expired entry restarts from zero and takes the given TTL,
    /// which makes one call both open a fixed window and count into it.
    fn increment(&self, key: &str, by: i64, ttl_secs: Option<i64>) -> i64;

    /// Remove a key
    fn forget(&self, key: &str);

    /// Drop expired entries, returning how many were removed
    fn purge_expired(&self) -> usize;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    /// Unix seconds; `None` never expires
    expires_at: Option<i64>,
}

impl CacheEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn expiry(now: i64, ttl_secs: Option<i64>) -> Option<i64> {
    ttl_secs.map(|ttl| now + ttl)
}

/// In-memory [`CacheStore`] over a sharded concurrent map.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, counting expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now().timestamp();
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.is_live(now) {
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };
        // Guard is dropped before the removal; dashmap deadlocks otherwise.
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, value: String, ttl_secs: Option<i64>) {
        let now = Utc::now().timestamp();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: expiry(now, ttl_secs),
            },
        );
    }

    fn increment(&self, key: &str, by: i64, ttl_secs: Option<i64>) -> i64 {
        let now = Utc::now().timestamp();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                value: "0".to_string(),
                expires_at: expiry(now, ttl_secs),
            });

        if !entry.is_live(now) {
            entry.value = "0".to_string();
            entry.expires_at = expiry(now, ttl_secs);
        }

        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + by;
        entry.value = next.to_string();
        next
    }

    fn forget(&self, key: &str) {
        self.entries.remove(key);
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_and_get() {
        let cache = InMemoryCache::new();
        cache.put("k", "v".to_string(), None);

        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = InMemoryCache::new();
        cache.put("k", "v".to_string(), Some(0));

        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_forget_removes_entry() {
        let cache = InMemoryCache::new();
        cache.put("k", "v".to_string(), None);
        cache.forget("k");

        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_increment_counts_up() {
        let cache = InMemoryCache::new();

        assert_eq!(cache.increment("counter", 1, Some(60)), 1);
        assert_eq!(cache.increment("counter", 1, Some(60)), 2);
        assert_eq!(cache.increment("counter", 3, Some(60)), 5);
    }

    #[test]
    fn test_increment_restarts_expired_window() {
        let cache = InMemoryCache::new();
        cache.put("counter", "40".to_string(), Some(0));

        // Expired entry restarts from zero instead of continuing the old count
        assert_eq!(cache.increment("counter", 1, Some(60)), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = InMemoryCache::new();
        cache.put("live", "v".to_string(), Some(3600));
        cache.put("dead-1", "v".to_string(), Some(0));
        cache.put("dead-2", "v".to_string(), Some(0));

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_counts() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();

        for _ in 0..20 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cache.increment("shared", 1, Some(60));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.increment("shared", 0, Some(60)), 200);
    }
}
