//! Key-value store abstraction underneath the read-through caches.
//!
//! Values are opaque bytes; (de)serialization happens one layer up in
//! [`crate::ReadThroughCache`]. Business code never talks to a store
//! directly.

use crate::CacheResult;
use std::time::Duration;

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete a key. Returns true if the key existed.
    async fn del(&self, key: &str) -> CacheResult<bool>;

    /// Delete every key starting with `prefix`. Returns the number purged.
    async fn del_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Health check
    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
