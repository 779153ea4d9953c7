//! Time-limited cache of warehouse slot directories

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use shared::SlotDirectory;
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::external::MoySkladClient;

struct CachedDirectory {
    directory: Arc<SlotDirectory>,
    fetched_at: Instant,
}

/// Slot directories keyed by store id. Owned by the application state and
/// handed to the location service; entries expire after `ttl` or on explicit
/// invalidation.
#[derive(Clone)]
pub struct SlotNameCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CachedDirectory>>>,
}

impl SlotNameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fresh cached directory of a store
    pub async fn get(&self, store_id: &str) -> Option<Arc<SlotDirectory>> {
        let entries = self.entries.read().await;
        entries
            .get(store_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.directory))
    }

    pub async fn put(&self, store_id: &str, directory: SlotDirectory) -> Arc<SlotDirectory> {
        let directory = Arc::new(directory);
        self.entries.write().await.insert(
            store_id.to_string(),
            CachedDirectory {
                directory: Arc::clone(&directory),
                fetched_at: Instant::now(),
            },
        );
        directory
    }

    /// Cached directory, fetched from the inventory system when missing or stale
    pub async fn get_or_fetch(
        &self,
        client: &MoySkladClient,
        store_id: &str,
    ) -> AppResult<Arc<SlotDirectory>> {
        if let Some(directory) = self.get(store_id).await {
            return Ok(directory);
        }

        let directory = client.get_store_slots(store_id).await?;
        tracing::info!("Loaded {} slots for store {}", directory.len(), store_id);
        Ok(self.put(store_id, directory).await)
    }

    pub async fn invalidate(&self, store_id: &str) {
        self.entries.write().await.remove(store_id);
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> SlotDirectory {
        [("s1", "Стеллаж 1 полка 2 ячейка A")].into_iter().collect()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = SlotNameCache::new(Duration::from_secs(60));
        assert!(cache.get("store").await.is_none());

        cache.put("store", directory()).await;
        let cached = cache.get("store").await.unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cache.get("other").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_ignored() {
        let cache = SlotNameCache::new(Duration::ZERO);
        cache.put("store", directory()).await;
        assert!(cache.get("store").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = SlotNameCache::new(Duration::from_secs(60));
        cache.put("a", directory()).await;
        cache.put("b", directory()).await;

        cache.invalidate("a").await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());

        cache.invalidate_all().await;
        assert!(cache.get("b").await.is_none());
    }
}
