//! Cache key schema
//!
//! Key format: v{VERSION}:{namespace}:{recipient_id}[:{offset}:{limit}]
//!
//! Timeline pages are keyed by the requested window so two different page
//! sizes never share an entry. All windows of one recipient share the
//! prefix returned by [`CacheKey::timeline_prefix`], which is what
//! invalidation purges.

/// Cache schema version - increment when changing key formats or value shapes
pub const CACHE_VERSION: u32 = 1;

/// Namespace of the follower-list cache
pub const FOLLOWERS_NAMESPACE: &str = "followers";

/// Namespace of the timeline-page cache
pub const TIMELINE_NAMESPACE: &str = "timeline";

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Follower list of a user
    /// Format: v1:followers:{user_id}
    pub fn followers(user_id: i64) -> String {
        format!("v{}:{}:{}", CACHE_VERSION, FOLLOWERS_NAMESPACE, user_id)
    }

    /// One window of a recipient's timeline
    /// Format: v1:timeline:{user_id}:{offset}:{limit}
    pub fn timeline_page(user_id: i64, offset: i64, limit: i64) -> String {
        format!(
            "v{}:{}:{}:{}:{}",
            CACHE_VERSION, TIMELINE_NAMESPACE, user_id, offset, limit
        )
    }

    /// Prefix shared by every cached window of a recipient's timeline.
    /// Ends with ':' so user 1 never matches user 12.
    pub fn timeline_prefix(user_id: i64) -> String {
        format!("v{}:{}:{}:", CACHE_VERSION, TIMELINE_NAMESPACE, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followers_key() {
        assert_eq!(CacheKey::followers(42), "v1:followers:42");
    }

    #[test]
    fn test_timeline_page_key_includes_window() {
        let first = CacheKey::timeline_page(7, 0, 15);
        let other_size = CacheKey::timeline_page(7, 0, 30);
        assert_eq!(first, "v1:timeline:7:0:15");
        assert_ne!(first, other_size);
    }

    #[test]
    fn test_timeline_prefix_does_not_overlap_other_users() {
        let prefix = CacheKey::timeline_prefix(1);
        assert!(CacheKey::timeline_page(1, 0, 15).starts_with(&prefix));
        assert!(!CacheKey::timeline_page(12, 0, 15).starts_with(&prefix));
    }
}
