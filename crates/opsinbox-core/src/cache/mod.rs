//! Short-lived page cache.
//!
//! Triage pages are cached for a few tens of seconds so that a dashboard
//! polling the same page does not re-list and re-classify on every refresh.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<T> {
    expires_at: Instant,
    value: T,
}

/// A TTL cache over string keys.
///
/// Entries expire after a fixed TTL; reads past expiry miss and evict.
/// Safe to share across tasks.
pub struct PageCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Clone> PageCache<T> {
    /// Creates a cache with the given time-to-live.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key` if it has not expired.
    pub async fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a value under `key`, replacing any previous entry.
    pub async fn insert(&self, key: String, value: T) {
        let entry = Entry {
            expires_at: Instant::now() + self.ttl,
            value,
        };
        self.entries.lock().await.insert(key, entry);
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache = PageCache::new(Duration::from_secs(30));
        cache.insert("10:".to_string(), vec![1, 2, 3]).await;

        assert_eq!(cache.get("10:").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.get("25:").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let cache = PageCache::new(Duration::ZERO);
        cache.insert("10:".to_string(), "page".to_string()).await;

        assert_eq!(cache.get("10:").await, None);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = PageCache::new(Duration::from_secs(30));
        cache.insert("a".to_string(), 1).await;
        cache.insert("b".to_string(), 2).await;
        cache.clear().await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let cache = PageCache::new(Duration::from_secs(30));
        cache.insert("k".to_string(), 1).await;
        cache.insert("k".to_string(), 2).await;

        assert_eq!(cache.get("k").await, Some(2));
    }
}
