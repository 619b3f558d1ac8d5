//! Fan-out writer
//!
//! Orchestrates publish, delete, follow and unfollow across the graph, post
//! and timeline stores. Not transactional: each step commits on its own.
//! Only the primary write of an operation can fail it; every propagation
//! step after that is retried, then logged and skipped.

use super::graph::SocialGraph;
use super::propagation::{FanoutReport, Propagator};
use super::queue::{FanoutJob, FanoutQueue};
use crate::domain::{FollowEdge, NewPost, Post, TimelineEntry, User};
use crate::error::{TimelineError, TimelineResult};
use crate::repository::Repositories;
use chrono::{SubsecRound, Utc};
use tracing::{info, warn};

/// Result of a successful follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowOutcome {
    pub edge: FollowEdge,
    /// Backfill pass into the follower's timeline
    pub backfill: FanoutReport,
}

/// Result of a successful unfollow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfollowOutcome {
    /// Entries by the unfollowed author removed from the follower's timeline
    pub removed_entries: u64,
}

#[derive(Clone)]
pub struct FanoutWriter {
    repos: Repositories,
    graph: SocialGraph,
    propagator: Propagator,
    queue: Option<FanoutQueue>,
    backfill_limit: i64,
}

impl FanoutWriter {
    pub fn new(
        repos: Repositories,
        graph: SocialGraph,
        propagator: Propagator,
        backfill_limit: i64,
    ) -> Self {
        Self {
            repos,
            graph,
            propagator,
            queue: None,
            backfill_limit,
        }
    }

    /// Hand follower loops to a background worker instead of running them inline
    pub fn with_queue(mut self, queue: FanoutQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub async fn publish(&self, author: &User, content: &str) -> TimelineResult<Post> {
        let new_post = NewPost {
            author_id: author.id,
            account: author.account.clone(),
            content: content.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };

        let post = self
            .repos
            .posts
            .insert_post(&new_post)
            .await
            .map_err(TimelineError::persistence("insert post"))?;

        let entry = TimelineEntry::for_post(&post);
        self.propagator.deliver(&entry, &[author.id]).await;

        if let Err(e) = self.repos.users.adjust_post_count(author.id, 1).await {
            warn!(
                operation = "adjust_post_count",
                user_id = author.id,
                post_id = post.id,
                error = %e,
                "Counter update failed"
            );
        }

        let recipients = self.follower_ids(author.id, post.id).await;
        self.dispatch(FanoutJob::Deliver { entry, recipients }).await;

        info!(post_id = post.id, author_id = author.id, "Post published");
        Ok(post)
    }

    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> TimelineResult<()> {
        let post = self
            .repos
            .posts
            .get_post(post_id)
            .await
            .map_err(TimelineError::persistence("load post"))?
            .ok_or(TimelineError::PostNotFound(post_id))?;
        if post.author_id != user_id {
            return Err(TimelineError::NotOwner { user_id, post_id });
        }

        let deleted = self
            .repos
            .posts
            .delete_post(post_id)
            .await
            .map_err(TimelineError::persistence("delete post"))?;
        // lost a race with another delete
        if !deleted {
            return Err(TimelineError::PostNotFound(post_id));
        }

        if let Err(e) = self.repos.users.adjust_post_count(user_id, -1).await {
            warn!(
                operation = "adjust_post_count",
                user_id,
                post_id,
                error = %e,
                "Counter update failed"
            );
        }

        let recipients = self.follower_ids(user_id, post_id).await;
        self.dispatch(FanoutJob::Retract {
            author_id: user_id,
            post_id,
            recipients,
        })
        .await;
        self.propagator.retract(user_id, post_id, &[user_id]).await;

        info!(post_id, author_id = user_id, "Post deleted");
        Ok(())
    }

    pub async fn follow(&self, follower_id: i64, target_id: i64) -> TimelineResult<FollowOutcome> {
        let edge = self.graph.follow(follower_id, target_id).await?;

        let entries = match self
            .repos
            .timeline
            .recent_self_entries(target_id, self.backfill_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    operation = "backfill",
                    recipient_id = follower_id,
                    author_id = target_id,
                    error = %e,
                    "Failed to load backfill entries"
                );
                Vec::new()
            }
        };
        let backfill = self.propagator.backfill(follower_id, &entries).await;

        Ok(FollowOutcome { edge, backfill })
    }

    pub async fn unfollow(
        &self,
        follower_id: i64,
        target_id: i64,
    ) -> TimelineResult<UnfollowOutcome> {
        self.graph.unfollow(follower_id, target_id).await?;
        let (removed_entries, _) = self.propagator.purge_author(follower_id, target_id).await;
        Ok(UnfollowOutcome { removed_entries })
    }

    /// Current follower ids. A failed lookup skips propagation for this post.
    async fn follower_ids(&self, author_id: i64, post_id: i64) -> Vec<i64> {
        match self.graph.list_followers(author_id).await {
            Ok(followers) => followers.into_iter().map(|f| f.id).collect(),
            Err(e) => {
                warn!(
                    operation = "list_followers",
                    author_id,
                    post_id,
                    error = %e,
                    "Failed to load followers, fan-out skipped"
                );
                Vec::new()
            }
        }
    }

    async fn dispatch(&self, job: FanoutJob) {
        if job.recipients().is_empty() {
            return;
        }
        let job = match &self.queue {
            Some(queue) => match queue.try_enqueue(job) {
                Ok(()) => return,
                Err(job) => {
                    warn!(post_id = job.post_id(), "Falling back to inline fan-out");
                    job
                }
            },
            None => job,
        };
        self.propagator.apply(job).await;
    }
}
