use super::caches::TimelineCaches;
use super::fanout::{FanoutWriter, FollowOutcome, UnfollowOutcome};
use super::graph::SocialGraph;
use super::propagation::Propagator;
use super::queue::FanoutQueue;
use super::retry::RetryConfig;
use crate::config::{FanoutConfig, TimelineConfig};
use crate::domain::{Follower, PageWindow, Post, TimelineItem, TimelinePage, User};
use crate::error::{ErrorKind, TimelineError, TimelineResult};
use crate::metrics;
use crate::repository::Repositories;
use timeline_cache::CacheKey;

/// Public entry points of the timeline engine.
///
/// Validates input before touching any store, then delegates writes to the
/// [`FanoutWriter`] and reads to the caches and repositories.
#[derive(Clone)]
pub struct TimelineService {
    repos: Repositories,
    caches: TimelineCaches,
    graph: SocialGraph,
    writer: FanoutWriter,
    propagator: Propagator,
    page_size_max: i64,
}

impl TimelineService {
    pub fn new(
        repos: Repositories,
        caches: TimelineCaches,
        fanout: &FanoutConfig,
        timeline: &TimelineConfig,
    ) -> Self {
        let retry = RetryConfig::default().with_max_retries(fanout.retry_attempts);
        let graph = SocialGraph::new(repos.users.clone(), repos.graph.clone(), caches.clone());
        let propagator = Propagator::new(repos.timeline.clone(), caches.clone(), retry);
        let writer = FanoutWriter::new(
            repos.clone(),
            graph.clone(),
            propagator.clone(),
            fanout.backfill_limit,
        );

        Self {
            repos,
            caches,
            graph,
            writer,
            propagator,
            page_size_max: timeline.page_size_max,
        }
    }

    /// Route follower loops of publish/delete through `queue`
    pub fn with_fanout_queue(mut self, queue: FanoutQueue) -> Self {
        self.writer = self.writer.with_queue(queue);
        self
    }

    /// Propagator for the queued fan-out worker
    pub fn propagator(&self) -> Propagator {
        self.propagator.clone()
    }

    pub async fn publish(&self, author_id: i64, content: &str) -> TimelineResult<Post> {
        let result = async {
            validate_id("author_id", author_id)?;
            if content.trim().is_empty() {
                return Err(TimelineError::Validation(
                    "content must not be empty".to_string(),
                ));
            }
            let author = self.load_user(author_id).await?;
            self.writer.publish(&author, content).await
        }
        .await;
        observe("publish", result)
    }

    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> TimelineResult<()> {
        let result = async {
            validate_id("user_id", user_id)?;
            validate_id("post_id", post_id)?;
            self.writer.delete_post(user_id, post_id).await
        }
        .await;
        observe("delete_post", result)
    }

    pub async fn follow(&self, follower_id: i64, target_id: i64) -> TimelineResult<FollowOutcome> {
        let result = async {
            validate_pair(follower_id, target_id)?;
            self.load_user(follower_id).await?;
            self.writer.follow(follower_id, target_id).await
        }
        .await;
        observe("follow", result)
    }

    pub async fn unfollow(
        &self,
        follower_id: i64,
        target_id: i64,
    ) -> TimelineResult<UnfollowOutcome> {
        let result = async {
            validate_pair(follower_id, target_id)?;
            self.writer.unfollow(follower_id, target_id).await
        }
        .await;
        observe("unfollow", result)
    }

    /// One page of `user_id`'s timeline with the user and their followers.
    ///
    /// `page` is 1-based. Pages are cached per (user, offset, limit) window.
    pub async fn timeline_page(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
    ) -> TimelineResult<TimelinePage> {
        let result = async {
            validate_id("user_id", user_id)?;
            if page < 1 {
                return Err(TimelineError::Validation(format!(
                    "page must be >= 1, got {page}"
                )));
            }
            if page_size < 1 || page_size > self.page_size_max {
                return Err(TimelineError::Validation(format!(
                    "page_size must be between 1 and {}, got {page_size}",
                    self.page_size_max
                )));
            }

            let user = self.load_user(user_id).await?;
            let window = PageWindow::from_page(page, page_size).ok_or_else(|| {
                TimelineError::Validation(format!(
                    "page {page} with page_size {page_size} is out of range"
                ))
            })?;
            let items = self.load_page(user_id, window).await?;
            let followers = self.graph.list_followers(user_id).await?;

            Ok::<_, TimelineError>(TimelinePage {
                user,
                followers,
                items,
                page,
                page_size,
            })
        }
        .await;
        observe("timeline_page", result)
    }

    pub async fn follower_list(&self, user_id: i64) -> TimelineResult<Vec<Follower>> {
        let result = async {
            validate_id("user_id", user_id)?;
            self.graph.list_followers(user_id).await
        }
        .await;
        observe("follower_list", result)
    }

    async fn load_user(&self, user_id: i64) -> TimelineResult<User> {
        self.repos
            .users
            .get_user(user_id)
            .await
            .map_err(TimelineError::persistence("load user"))?
            .ok_or(TimelineError::UserNotFound(user_id))
    }

    async fn load_page(
        &self,
        user_id: i64,
        window: PageWindow,
    ) -> TimelineResult<Vec<TimelineItem>> {
        let timeline = self.repos.timeline.clone();
        let key = CacheKey::timeline_page(user_id, window.offset, window.limit);
        self.caches
            .timeline
            .get_or_load(&key, || async move {
                timeline.page(user_id, window.offset, window.limit).await
            })
            .await
            .map_err(TimelineError::persistence("load timeline page"))
    }
}

fn validate_id(field: &str, id: i64) -> TimelineResult<()> {
    if id <= 0 {
        return Err(TimelineError::Validation(format!(
            "{field} must be positive, got {id}"
        )));
    }
    Ok(())
}

fn validate_pair(follower_id: i64, target_id: i64) -> TimelineResult<()> {
    validate_id("follower_id", follower_id)?;
    validate_id("target_id", target_id)?;
    if follower_id == target_id {
        return Err(TimelineError::Validation(
            "users cannot follow themselves".to_string(),
        ));
    }
    Ok(())
}

fn observe<T>(operation: &str, result: TimelineResult<T>) -> TimelineResult<T> {
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => match e.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ownership => "ownership",
            ErrorKind::Persistence => "persistence",
        },
    };
    metrics::record_operation(operation, status);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use timeline_cache::InMemoryKvStore;

    fn service() -> (TimelineService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let caches = TimelineCaches::with_ttls(
            Arc::new(InMemoryKvStore::new()),
            Duration::from_secs(300),
            Duration::from_secs(600),
        );
        let service = TimelineService::new(
            Repositories::in_memory(store.clone()),
            caches,
            &FanoutConfig::default(),
            &TimelineConfig::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_validation_happens_before_store_access() {
        let (service, store) = service();
        store.fail_post_inserts(true);

        let err = service.publish(1, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.follow(3, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.unfollow(0, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.delete_post(1, -4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_page_bounds() {
        let (service, store) = service();
        let user = store.create_user("alice", "a.png").await;

        assert!(matches!(
            service.timeline_page(user.id, 0, 15).await,
            Err(TimelineError::Validation(_))
        ));
        assert!(matches!(
            service.timeline_page(user.id, 1, 0).await,
            Err(TimelineError::Validation(_))
        ));
        assert!(matches!(
            service.timeline_page(user.id, 1, 101).await,
            Err(TimelineError::Validation(_))
        ));
        assert!(service.timeline_page(user.id, 1, 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_page_offset_overflow_is_rejected() {
        let (service, store) = service();
        let user = store.create_user("alice", "a.png").await;

        assert!(matches!(
            service.timeline_page(user.id, i64::MAX, 100).await,
            Err(TimelineError::Validation(_))
        ));
        // largest window that still fits is just empty
        let page = service.timeline_page(user.id, i64::MAX, 1).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_users() {
        let (service, store) = service();
        let user = store.create_user("alice", "a.png").await;

        assert!(matches!(
            service.timeline_page(999, 1, 15).await,
            Err(TimelineError::UserNotFound(999))
        ));
        assert!(matches!(
            service.publish(999, "hello").await,
            Err(TimelineError::UserNotFound(999))
        ));
        assert!(matches!(
            service.follow(user.id, 999).await,
            Err(TimelineError::TargetNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_failed_post_insert_is_surfaced() {
        let (service, store) = service();
        let user = store.create_user("alice", "a.png").await;
        store.fail_post_inserts(true);

        let err = service.publish(user.id, "hello").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("insert post failed"));
        assert_eq!(store.timeline_len().await, 0);
    }
}
