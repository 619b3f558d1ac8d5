//! Read-through caching for the timeline engine
//!
//! - Versioned key schema ([`CacheKey`])
//! - Pluggable byte store ([`KvStore`]): Redis in production, in-memory for tests
//! - Typed [`ReadThroughCache`] with TTL, explicit and prefix invalidation
//! - Prometheus metrics per cache namespace

mod error;
mod keys;
mod memory;
mod metrics;
mod read_through;
mod redis_store;
mod store;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION, FOLLOWERS_NAMESPACE, TIMELINE_NAMESPACE};
pub use memory::InMemoryKvStore;
pub use metrics::CacheMetrics;
pub use read_through::{CacheLookup, ReadThroughCache};
pub use redis_store::{RedisKvStore, SharedRedis};
pub use store::KvStore;

/// Default TTL values (seconds)
pub mod ttl {
    pub const FOLLOWERS: u64 = 300; // 5 minutes
    pub const TIMELINE_PAGE: u64 = 600; // 10 minutes
}
