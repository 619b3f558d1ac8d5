use crate::config::CacheConfig;
use crate::domain::{Follower, TimelineItem};
use std::sync::Arc;
use std::time::Duration;
use timeline_cache::{CacheKey, KvStore, ReadThroughCache, FOLLOWERS_NAMESPACE, TIMELINE_NAMESPACE};
use tracing::warn;

/// The two read-through caches of the engine.
///
/// Invalidation helpers never fail: a purge that cannot reach the cache is
/// logged and the entry is left to expire by TTL.
#[derive(Clone)]
pub struct TimelineCaches {
    pub followers: ReadThroughCache<Vec<Follower>>,
    pub timeline: ReadThroughCache<Vec<TimelineItem>>,
}

impl TimelineCaches {
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self::with_ttls(store, config.followers_ttl(), config.timeline_ttl())
            .with_jitter(config.ttl_jitter_percent)
            .with_enabled(config.enabled)
    }

    pub fn with_ttls(
        store: Arc<dyn KvStore>,
        followers_ttl: Duration,
        timeline_ttl: Duration,
    ) -> Self {
        Self {
            followers: ReadThroughCache::new(store.clone(), FOLLOWERS_NAMESPACE, followers_ttl),
            timeline: ReadThroughCache::new(store, TIMELINE_NAMESPACE, timeline_ttl),
        }
    }

    pub fn with_jitter(self, percent: u32) -> Self {
        Self {
            followers: self.followers.with_jitter(percent),
            timeline: self.timeline.with_jitter(percent),
        }
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        Self {
            followers: self.followers.with_enabled(enabled),
            timeline: self.timeline.with_enabled(enabled),
        }
    }

    /// Drop the cached follower list of `user_id`
    pub async fn invalidate_followers(&self, user_id: i64) {
        if let Err(e) = self.followers.invalidate(&CacheKey::followers(user_id)).await {
            warn!(user_id, error = %e, "Failed to invalidate follower-list cache");
        }
    }

    /// Drop every cached page window of `user_id`'s timeline
    pub async fn invalidate_timeline(&self, user_id: i64) {
        if let Err(e) = self
            .timeline
            .invalidate_prefix(&CacheKey::timeline_prefix(user_id))
            .await
        {
            warn!(user_id, error = %e, "Failed to invalidate timeline cache");
        }
    }
}
