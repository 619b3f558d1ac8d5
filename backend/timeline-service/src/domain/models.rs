use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User with denormalized counters.
///
/// Counters are maintained by the fan-out writer as a side effect of graph
/// and post operations. They are recomputable from `following` and `weibos`
/// and are served as-is to avoid aggregate queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub account: String,
    pub avatar: String,
    pub following_count: i32,
    pub follower_count: i32,
    pub post_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Directed follow edge, unique per (follower, followee)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub follower_id: i64,
    pub followee_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Follower-list row: the public identity of one follower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub id: i64,
    pub account: String,
    pub avatar: String,
}

/// Post (a "weibo")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    /// Author account at publish time (redundant copy)
    pub account: String,
    pub content: String,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Row to insert for a new post; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub account: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// "This post is visible in this recipient's feed."
///
/// Unique per (recipient_id, post_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimelineEntry {
    pub recipient_id: i64,
    pub author_id: i64,
    pub post_id: i64,
    pub post_created_at: DateTime<Utc>,
}

impl TimelineEntry {
    /// The author's own entry for a freshly published post
    pub fn for_post(post: &Post) -> Self {
        Self {
            recipient_id: post.author_id,
            author_id: post.author_id,
            post_id: post.id,
            post_created_at: post.created_at,
        }
    }

    /// Same post metadata, delivered to another recipient
    pub fn with_recipient(&self, recipient_id: i64) -> Self {
        Self {
            recipient_id,
            ..self.clone()
        }
    }
}

/// Timeline entry joined with its post and the post's author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimelineItem {
    pub post_id: i64,
    pub author_id: i64,
    pub account: String,
    pub avatar: String,
    pub content: String,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
}

/// One page of a user's timeline plus the refreshed user aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePage {
    pub user: User,
    pub followers: Vec<Follower>,
    pub items: Vec<TimelineItem>,
    pub page: i64,
    pub page_size: i64,
}

/// Offset/limit window derived from a 1-based page number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: i64,
    pub limit: i64,
}

impl PageWindow {
    /// `page` is 1-based. Returns `None` when `page < 1`, `page_size < 1`,
    /// or the offset does not fit in an `i64`.
    pub fn from_page(page: i64, page_size: i64) -> Option<Self> {
        if page < 1 || page_size < 1 {
            return None;
        }
        let offset = (page - 1).checked_mul(page_size)?;
        Some(Self {
            offset,
            limit: page_size,
        })
    }
}
