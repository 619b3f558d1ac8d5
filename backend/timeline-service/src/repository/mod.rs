//! Storage seams for the timeline engine.
//!
//! The engine only talks to these traits. [`PostgresStore`] is the durable
//! implementation; [`InMemoryStore`] backs tests and supports fault
//! injection for exercising the partial-failure policy.

pub mod memory;
pub mod postgres;

use crate::domain::{FollowEdge, Follower, NewPost, Post, TimelineEntry, TimelineItem, User};
use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// User rows and their denormalized counters
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>>;

    /// User ids greater than `after`, ascending, at most `limit`
    async fn list_user_ids(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>>;

    /// Counter updates clamp at zero
    async fn adjust_following_count(&self, user_id: i64, delta: i32) -> StoreResult<()>;

    async fn adjust_follower_count(&self, user_id: i64, delta: i32) -> StoreResult<()>;

    async fn adjust_post_count(&self, user_id: i64, delta: i32) -> StoreResult<()>;
}

/// Follow edges
#[async_trait::async_trait]
pub trait GraphRepository: Send + Sync {
    async fn get_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> StoreResult<Option<FollowEdge>>;

    /// Conditional insert. Returns false when the edge already existed.
    async fn create_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Returns false when there was no edge to delete
    async fn delete_follow_edge(&self, follower_id: i64, followee_id: i64) -> StoreResult<bool>;

    /// Followers of `user_id` in edge insertion order
    async fn list_followers(&self, user_id: i64) -> StoreResult<Vec<Follower>>;

    async fn list_following_ids(&self, user_id: i64) -> StoreResult<Vec<i64>>;
}

/// Posts
#[async_trait::async_trait]
pub trait PostRepository: Send + Sync {
    async fn insert_post(&self, post: &NewPost) -> StoreResult<Post>;

    async fn get_post(&self, post_id: i64) -> StoreResult<Option<Post>>;

    async fn delete_post(&self, post_id: i64) -> StoreResult<bool>;

    /// Most recent posts of one author, newest first
    async fn recent_posts_by_author(&self, author_id: i64, limit: i64) -> StoreResult<Vec<Post>>;
}

/// Materialized per-recipient timeline
#[async_trait::async_trait]
pub trait TimelineRepository: Send + Sync {
    /// Idempotent on (recipient, post). Returns false for a duplicate.
    async fn insert_entry(&self, entry: &TimelineEntry) -> StoreResult<bool>;

    /// The author's own entries (recipient = author = `user_id`), newest first
    async fn recent_self_entries(&self, user_id: i64, limit: i64)
        -> StoreResult<Vec<TimelineEntry>>;

    async fn delete_entry(&self, recipient_id: i64, post_id: i64) -> StoreResult<bool>;

    /// Remove every entry in `recipient_id`'s feed authored by `author_id`
    async fn delete_entries_by_author(&self, recipient_id: i64, author_id: i64)
        -> StoreResult<u64>;

    /// One window of the feed joined with post and author, ordered by post
    /// creation time descending, then post id descending
    async fn page(&self, recipient_id: i64, offset: i64, limit: i64)
        -> StoreResult<Vec<TimelineItem>>;

    /// Distinct authors present in `recipient_id`'s feed
    async fn entry_authors(&self, recipient_id: i64) -> StoreResult<Vec<i64>>;

    /// Remove entries whose post no longer exists
    async fn delete_orphaned_entries(&self, recipient_id: i64) -> StoreResult<u64>;
}

/// Handles to every repository the engine needs
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub graph: Arc<dyn GraphRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub timeline: Arc<dyn TimelineRepository>,
}

impl Repositories {
    pub fn postgres(store: PostgresStore) -> Self {
        Self::from_store(Arc::new(store))
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self::from_store(store)
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository + GraphRepository + PostRepository + TimelineRepository + 'static,
    {
        Self {
            users: store.clone(),
            graph: store.clone(),
            posts: store.clone(),
            timeline: store,
        }
    }
}
