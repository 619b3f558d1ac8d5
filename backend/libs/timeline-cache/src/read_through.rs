//! Generic read-through cache
//!
//! One instance per value shape (follower list, timeline page). A hit must
//! be indistinguishable from a miss followed by a fresh load, so values are
//! stored as the serde form of the exact type the loader returns.
//!
//! Concurrent misses on the same key are not coalesced: every miss runs its
//! loader and rewrites the key. Loaders are idempotent reads, so the last
//! writer wins with an equally valid value.

use crate::{CacheMetrics, CacheResult, KvStore};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a plain cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

pub struct ReadThroughCache<T> {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    jitter_percent: u32,
    enabled: bool,
    metrics: CacheMetrics,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for ReadThroughCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
            jitter_percent: self.jitter_percent,
            enabled: self.enabled,
            metrics: self.metrics.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> ReadThroughCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn KvStore>, namespace: &'static str, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            jitter_percent: 0,
            enabled: true,
            metrics: CacheMetrics::new(namespace),
            _value: PhantomData,
        }
    }

    /// Spread expiry by up to `percent` of the TTL so keys written together
    /// do not all expire together
    pub fn with_jitter(mut self, percent: u32) -> Self {
        self.jitter_percent = percent.min(100);
        self
    }

    /// A disabled cache always misses and never writes
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn ttl_with_jitter(&self) -> Duration {
        if self.jitter_percent == 0 {
            return self.ttl;
        }
        let percent = rand::random::<u32>() % (self.jitter_percent + 1);
        self.ttl + self.ttl * percent / 100
    }

    /// Look a key up without loading on miss
    pub async fn get(&self, key: &str) -> CacheResult<CacheLookup<T>> {
        if !self.enabled {
            return Ok(CacheLookup::Miss);
        }

        let raw = match self.store.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.record_error(e.kind());
                return Err(e);
            }
        };

        match raw {
            Some(bytes) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    self.metrics.record_hit();
                    Ok(CacheLookup::Hit(value))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization failed");
                    self.metrics.record_error("deserialize");
                    // Corrupted entry: drop it and treat as a miss
                    if let Err(e) = self.store.del(key).await {
                        warn!(key = %key, error = %e, "Failed to drop corrupt cache entry");
                    }
                    Ok(CacheLookup::Miss)
                }
            },
            None => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss();
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Store a value under `key` with this cache's TTL
    pub async fn put(&self, key: &str, value: &T) -> CacheResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let data = serde_json::to_vec(value)?;
        let ttl = self.ttl_with_jitter();
        if let Err(e) = self.store.set_ex(key, data, ttl).await {
            self.metrics.record_error(e.kind());
            return Err(e);
        }

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        self.metrics.record_write();
        Ok(())
    }

    /// Return the cached value, or run `loader`, cache its result and return it.
    ///
    /// Cache failures never fail the read: they are logged and the loader's
    /// answer is returned. Loader errors are returned unchanged and nothing
    /// is cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get(key).await {
            Ok(CacheLookup::Hit(value)) => return Ok(value),
            Ok(CacheLookup::Miss) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, loading from store");
            }
        }

        let value = loader().await?;

        if let Err(e) = self.put(key, &value).await {
            warn!(key = %key, error = %e, "Failed to populate cache");
        }

        Ok(value)
    }

    /// Purge one key. Returns true if something was removed.
    pub async fn invalidate(&self, key: &str) -> CacheResult<bool> {
        if !self.enabled {
            return Ok(false);
        }

        let removed = self.store.del(key).await.map_err(|e| {
            self.metrics.record_error(e.kind());
            e
        })?;
        if removed {
            self.metrics.record_invalidation(1);
        }
        debug!(key = %key, removed, "Cache invalidate");
        Ok(removed)
    }

    /// Purge every key starting with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let purged = self.store.del_prefix(prefix).await.map_err(|e| {
            self.metrics.record_error(e.kind());
            e
        })?;
        self.metrics.record_invalidation(purged);
        debug!(prefix = %prefix, purged, "Cache prefix invalidate");
        Ok(purged)
    }
}
