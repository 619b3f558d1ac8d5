use super::caches::TimelineCaches;
use crate::domain::{FollowEdge, Follower};
use crate::error::{TimelineError, TimelineResult};
use crate::repository::{GraphRepository, UserRepository};
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use timeline_cache::CacheKey;
use tracing::{info, warn};

/// Follow edges, follow counters and the cached follower list.
///
/// Edge writes are the primary step of follow/unfollow and fail the call.
/// Counter updates are best-effort. The followee's follower-list cache is
/// purged after every successful edge change.
#[derive(Clone)]
pub struct SocialGraph {
    users: Arc<dyn UserRepository>,
    graph: Arc<dyn GraphRepository>,
    caches: TimelineCaches,
}

impl SocialGraph {
    pub fn new(
        users: Arc<dyn UserRepository>,
        graph: Arc<dyn GraphRepository>,
        caches: TimelineCaches,
    ) -> Self {
        Self {
            users,
            graph,
            caches,
        }
    }

    pub async fn follow(&self, follower_id: i64, followee_id: i64) -> TimelineResult<FollowEdge> {
        self.users
            .get_user(followee_id)
            .await
            .map_err(TimelineError::persistence("load follow target"))?
            .ok_or(TimelineError::TargetNotFound(followee_id))?;

        let already_following = self
            .graph
            .get_follow_edge(follower_id, followee_id)
            .await
            .map_err(TimelineError::persistence("check follow edge"))?
            .is_some();
        if already_following {
            return Err(TimelineError::AlreadyFollowing {
                follower_id,
                followee_id,
            });
        }

        let created_at = Utc::now().trunc_subsecs(6);
        let created = self
            .graph
            .create_follow_edge(follower_id, followee_id, created_at)
            .await
            .map_err(TimelineError::persistence("create follow edge"))?;
        // a concurrent follow won the insert
        if !created {
            return Err(TimelineError::AlreadyFollowing {
                follower_id,
                followee_id,
            });
        }

        self.adjust_counters(follower_id, followee_id, 1).await;
        self.caches.invalidate_followers(followee_id).await;

        info!(follower_id, followee_id, "Follow edge created");
        Ok(FollowEdge {
            follower_id,
            followee_id,
            created_at,
        })
    }

    pub async fn unfollow(&self, follower_id: i64, followee_id: i64) -> TimelineResult<()> {
        let not_following = TimelineError::NotFollowing {
            follower_id,
            followee_id,
        };

        let edge = self
            .graph
            .get_follow_edge(follower_id, followee_id)
            .await
            .map_err(TimelineError::persistence("check follow edge"))?;
        if edge.is_none() {
            return Err(not_following);
        }

        let deleted = self
            .graph
            .delete_follow_edge(follower_id, followee_id)
            .await
            .map_err(TimelineError::persistence("delete follow edge"))?;
        if !deleted {
            return Err(not_following);
        }

        self.adjust_counters(follower_id, followee_id, -1).await;
        self.caches.invalidate_followers(followee_id).await;

        info!(follower_id, followee_id, "Follow edge removed");
        Ok(())
    }

    /// Followers of `user_id` in follow order, read through the cache
    pub async fn list_followers(&self, user_id: i64) -> TimelineResult<Vec<Follower>> {
        let graph = self.graph.clone();
        self.caches
            .followers
            .get_or_load(&CacheKey::followers(user_id), || async move {
                graph.list_followers(user_id).await
            })
            .await
            .map_err(TimelineError::persistence("list followers"))
    }

    async fn adjust_counters(&self, follower_id: i64, followee_id: i64, delta: i32) {
        if let Err(e) = self.users.adjust_following_count(follower_id, delta).await {
            warn!(
                operation = "adjust_following_count",
                user_id = follower_id,
                delta,
                error = %e,
                "Counter update failed"
            );
        }
        if let Err(e) = self.users.adjust_follower_count(followee_id, delta).await {
            warn!(
                operation = "adjust_follower_count",
                user_id = followee_id,
                delta,
                error = %e,
                "Counter update failed"
            );
        }
    }
}
