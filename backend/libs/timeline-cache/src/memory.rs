//! In-memory [`KvStore`] for tests and single-process embedding.
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can step past a TTL with `tokio::time::advance`.

use crate::{CacheError, CacheResult, KvStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`CacheError::Backend`] until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("in-memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn del_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let store = InMemoryKvStore::new();
        store
            .set_ex("k", b"v".to_vec(), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_prefix_only_touches_matching_keys() {
        let store = InMemoryKvStore::new();
        let ttl = Duration::from_secs(60);
        store.set_ex("v1:timeline:1:0:15", vec![1], ttl).await.unwrap();
        store.set_ex("v1:timeline:1:15:15", vec![2], ttl).await.unwrap();
        store.set_ex("v1:timeline:12:0:15", vec![3], ttl).await.unwrap();

        let purged = store.del_prefix("v1:timeline:1:").await.unwrap();

        assert_eq!(purged, 2);
        assert!(store.get("v1:timeline:12:0:15").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryKvStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("k").await,
            Err(CacheError::Backend(_))
        ));

        store.set_unavailable(false);
        assert!(store.get("k").await.unwrap().is_none());
    }
}
