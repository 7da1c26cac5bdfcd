//! TTL-bounded in-memory cache.
//!
//! Entries are fresh while `now - stored_at < ttl`. Stale entries are kept
//! around until the sweeper removes them so they can serve as a last-resort
//! fallback when a refetch fails. Mutation is last-writer-wins per key;
//! reads never block on unrelated writes beyond the map lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// A capacity- and TTL-bounded cache.
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
    default_ttl: Duration,
    capacity: usize,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Creates a cache with a default entry TTL and a capacity bound.
    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
            capacity,
        }
    }

    /// Returns the value for `key` if present and fresh.
    pub async fn get_fresh(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Returns the value for `key` regardless of freshness.
    ///
    /// This is the stale-fallback read used when a refetch fails.
    pub async fn get_any(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts with the default TTL, overwriting any previous entry.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl).await;
    }

    /// Inserts with an explicit TTL.
    pub async fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );

        // Capacity pressure: evict oldest entries first.
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Removes entries whose age exceeds their TTL. Returns the number
    /// removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    /// Returns the number of entries, fresh or stale.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawns the periodic sweep task, bounding memory growth independent of
    /// read traffic. Abort the handle on shutdown.
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries = self.entries.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut entries = entries.write().await;
                let before = entries.len();
                entries.retain(|_, entry| entry.is_fresh(now));
                let removed = before - entries.len();
                if removed > 0 {
                    tracing::debug!(removed, "cache sweep removed expired entries");
                }
            }
        })
    }
}

/// Canonical cache key for a query: trimmed, lowercased, inner whitespace
/// collapsed.
pub fn canonical_key(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_hit_and_expiry() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_millis(30), 16);
        cache.insert("k", "v".to_string()).await;

        assert_eq!(cache.get_fresh("k").await, Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_fresh("k").await, None);
        // Still available for stale fallback until swept.
        assert_eq!(cache.get_any("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(20), 16);
        cache.insert("old", 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.insert("new", 2).await;

        let removed = cache.sweep().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.get_any("old").await, None);
        assert_eq!(cache.get_fresh("new").await, Some(2));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.insert("b", 2).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_any("a").await, None);
        assert_eq!(cache.get_any("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 16);
        cache.insert("k", 1).await;
        cache.insert("k", 2).await;
        assert_eq!(cache.get_fresh("k").await, Some(2));
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("  Write   a HAIKU  "), "write a haiku");
        assert_eq!(canonical_key("haiku"), canonical_key(" Haiku "));
    }
}
