//! Redis-backed [`KvStore`]

use crate::{CacheError, CacheResult, KvStore};
use anyhow::Context;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Keys visited per SCAN round trip
const SCAN_COUNT: usize = 100;

#[derive(Clone)]
pub struct RedisKvStore {
    redis: SharedRedis,
}

impl RedisKvStore {
    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }

    /// Open a connection manager for `redis_url`
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url).context("failed to construct Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;
        info!("Connected to Redis cache store");
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.redis.lock().await;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(CacheError::Redis)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        // PSETEX rejects a zero expiry
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let mut conn = self.redis.lock().await;
        redis::cmd("PSETEX")
            .arg(key)
            .arg(ttl_ms)
            .arg(value)
            .query_async::<_, ()>(&mut *conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.redis.lock().await;
        let removed: i64 = conn.del(key).await.map_err(CacheError::Redis)?;
        Ok(removed > 0)
    }

    async fn del_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = format!("{}*", prefix);
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            // SCAN instead of KEYS so a large keyspace never blocks Redis
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::Redis)?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut *conn)
                    .await
                    .map_err(CacheError::Redis)?;

                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "Redis prefix delete");
        Ok(total_deleted)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| {
                warn!(error = %e, "Redis PING failed");
                CacheError::Redis(e)
            })?;
        Ok(())
    }
}
