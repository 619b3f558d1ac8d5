use std::sync::Arc;
use std::time::Duration;
use timeline_cache::{CacheKey, InMemoryKvStore};
use timeline_service::config::{FanoutConfig, TimelineConfig};
use timeline_service::domain::User;
use timeline_service::jobs::TimelineReconciler;
use timeline_service::repository::{PostRepository, TimelineRepository, UserRepository};
use timeline_service::{InMemoryStore, Repositories, TimelineCaches, TimelineError, TimelineService};

struct Harness {
    store: Arc<InMemoryStore>,
    kv: Arc<InMemoryKvStore>,
    caches: TimelineCaches,
    service: TimelineService,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let kv = Arc::new(InMemoryKvStore::new());
        let caches = TimelineCaches::with_ttls(
            kv.clone(),
            Duration::from_secs(300),
            Duration::from_secs(600),
        );
        let fanout = FanoutConfig {
            retry_attempts: 1,
            ..Default::default()
        };
        let service = TimelineService::new(
            Repositories::in_memory(store.clone()),
            caches.clone(),
            &fanout,
            &TimelineConfig::default(),
        );
        Self {
            store,
            kv,
            caches,
            service,
        }
    }

    async fn user(&self, account: &str) -> User {
        self.store
            .create_user(account, &format!("{account}.png"))
            .await
    }

    async fn page_post_ids(&self, user_id: i64, page: i64, page_size: i64) -> Vec<i64> {
        self.service
            .timeline_page(user_id, page, page_size)
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|item| item.post_id)
            .collect()
    }

    async fn reload(&self, user_id: i64) -> User {
        self.store.get_user(user_id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn follow_then_unfollow_scenario() {
    let h = Harness::new();
    let u1 = h.user("u1").await;
    let u2 = h.user("u2").await;

    let p1 = h.service.publish(u2.id, "first").await.unwrap();
    let p2 = h.service.publish(u2.id, "second").await.unwrap();

    let outcome = h.service.follow(u1.id, u2.id).await.unwrap();
    assert_eq!(outcome.backfill.applied, 2);
    assert_eq!(h.page_post_ids(u1.id, 1, 15).await, vec![p2.id, p1.id]);

    let p3 = h.service.publish(u2.id, "third").await.unwrap();
    assert_eq!(
        h.page_post_ids(u1.id, 1, 15).await,
        vec![p3.id, p2.id, p1.id]
    );

    let outcome = h.service.unfollow(u1.id, u2.id).await.unwrap();
    assert_eq!(outcome.removed_entries, 3);
    assert!(h.page_post_ids(u1.id, 1, 15).await.is_empty());

    // author still sees their own posts
    assert_eq!(
        h.page_post_ids(u2.id, 1, 15).await,
        vec![p3.id, p2.id, p1.id]
    );
}

#[tokio::test]
async fn follow_updates_followers_and_purges_cached_list() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;

    assert!(h.service.follower_list(b.id).await.unwrap().is_empty());
    let key = CacheKey::followers(b.id);
    assert!(h.caches.followers.get(&key).await.unwrap().is_hit());

    h.service.follow(a.id, b.id).await.unwrap();

    assert!(!h.caches.followers.get(&key).await.unwrap().is_hit());
    let followers = h.service.follower_list(b.id).await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].id, a.id);
    assert_eq!(followers[0].account, "a");
    assert_eq!(followers[0].avatar, "a.png");

    assert_eq!(h.reload(a.id).await.following_count, 1);
    assert_eq!(h.reload(b.id).await.follower_count, 1);
}

#[tokio::test]
async fn duplicate_follow_and_missing_unfollow_conflict() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;

    h.service.follow(a.id, b.id).await.unwrap();
    let err = h.service.follow(a.id, b.id).await.unwrap_err();
    assert!(matches!(err, TimelineError::AlreadyFollowing { .. }));
    // counters not double counted
    assert_eq!(h.reload(b.id).await.follower_count, 1);

    let err = h.service.unfollow(b.id, a.id).await.unwrap_err();
    assert!(matches!(err, TimelineError::NotFollowing { .. }));

    h.service.unfollow(a.id, b.id).await.unwrap();
    assert_eq!(h.reload(a.id).await.following_count, 0);
    assert_eq!(h.reload(b.id).await.follower_count, 0);
    assert!(matches!(
        h.service.unfollow(a.id, b.id).await,
        Err(TimelineError::NotFollowing { .. })
    ));
}

#[tokio::test]
async fn concurrent_duplicate_follow_creates_one_edge() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;

    let (first, second) = tokio::join!(h.service.follow(a.id, b.id), h.service.follow(a.id, b.id));

    let (ok, conflict): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(|r| r.is_ok());
    assert_eq!(ok.len(), 1);
    assert!(matches!(
        conflict.into_iter().next(),
        Some(Err(TimelineError::AlreadyFollowing { .. }))
    ));
    assert_eq!(h.reload(b.id).await.follower_count, 1);
    assert_eq!(h.reload(a.id).await.following_count, 1);
    assert_eq!(h.service.follower_list(b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn follow_survives_failed_backfill() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.service.publish(b.id, "one").await.unwrap();
    h.service.publish(b.id, "two").await.unwrap();

    h.store.fail_timeline_writes_for(a.id, 10).await;
    let outcome = h.service.follow(a.id, b.id).await.unwrap();

    assert_eq!(outcome.backfill.failed, 2);
    assert_eq!(outcome.backfill.applied, 0);
    assert!(h.store.timeline_entries(a.id).await.is_empty());
    let followers = h.service.follower_list(b.id).await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].id, a.id);
}

#[tokio::test]
async fn publish_reaches_author_and_every_follower() {
    let h = Harness::new();
    let author = h.user("author").await;
    let mut followers = Vec::new();
    for name in ["f1", "f2", "f3"] {
        let f = h.user(name).await;
        h.service.follow(f.id, author.id).await.unwrap();
        followers.push(f);
    }

    let post = h.service.publish(author.id, "hello").await.unwrap();
    assert_eq!(post.account, "author");
    assert_eq!(h.reload(author.id).await.post_count, 1);

    assert_eq!(h.page_post_ids(author.id, 1, 15).await, vec![post.id]);
    for f in &followers {
        let page = h.service.timeline_page(f.id, 1, 15).await.unwrap();
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.post_id, post.id);
        assert_eq!(item.author_id, author.id);
        assert_eq!(item.avatar, "author.png");
        assert_eq!(item.content, "hello");
        assert_eq!(item.created_at, post.created_at);
    }
}

#[tokio::test]
async fn delete_removes_post_from_every_timeline() {
    let h = Harness::new();
    let author = h.user("author").await;
    let f1 = h.user("f1").await;
    let f2 = h.user("f2").await;
    h.service.follow(f1.id, author.id).await.unwrap();
    h.service.follow(f2.id, author.id).await.unwrap();

    let keep = h.service.publish(author.id, "keep").await.unwrap();
    let post = h.service.publish(author.id, "remove me").await.unwrap();
    // warm the page caches
    for id in [author.id, f1.id, f2.id] {
        assert_eq!(h.page_post_ids(id, 1, 15).await, vec![post.id, keep.id]);
    }

    h.service.delete_post(author.id, post.id).await.unwrap();

    for id in [author.id, f1.id, f2.id] {
        assert_eq!(h.page_post_ids(id, 1, 15).await, vec![keep.id]);
    }
    assert_eq!(h.reload(author.id).await.post_count, 1);
    assert!(matches!(
        h.service.delete_post(author.id, post.id).await,
        Err(TimelineError::PostNotFound(id)) if id == post.id
    ));
}

#[tokio::test]
async fn delete_by_non_author_is_rejected() {
    let h = Harness::new();
    let author = h.user("author").await;
    let other = h.user("other").await;
    let post = h.service.publish(author.id, "mine").await.unwrap();

    let err = h.service.delete_post(other.id, post.id).await.unwrap_err();
    assert!(matches!(err, TimelineError::NotOwner { .. }));
    assert!(h.store.get_post(post.id).await.unwrap().is_some());
}

#[tokio::test]
async fn unfollow_removes_every_entry_of_that_author() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;
    let c = h.user("c").await;
    h.service.follow(a.id, b.id).await.unwrap();
    h.service.follow(a.id, c.id).await.unwrap();

    for i in 0..5 {
        h.service.publish(b.id, &format!("b{i}")).await.unwrap();
    }
    let from_c = h.service.publish(c.id, "c").await.unwrap();

    h.service.unfollow(a.id, b.id).await.unwrap();

    let entries = h.store.timeline_entries(a.id).await;
    assert!(entries.iter().all(|e| e.author_id != b.id));
    assert_eq!(h.page_post_ids(a.id, 1, 15).await, vec![from_c.id]);
}

#[tokio::test]
async fn backfill_is_bounded_to_thirty_posts() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;
    for i in 0..35 {
        h.service.publish(b.id, &format!("post {i}")).await.unwrap();
    }

    let outcome = h.service.follow(a.id, b.id).await.unwrap();

    assert_eq!(outcome.backfill.applied, 30);
    assert_eq!(h.store.timeline_entries(a.id).await.len(), 30);
    // newest posts are the ones copied
    let newest = h.store.timeline_entries(b.id).await;
    let copied = h.store.timeline_entries(a.id).await;
    assert_eq!(copied[0].post_id, newest[0].post_id);
    assert_eq!(copied[0].post_created_at, newest[0].post_created_at);
}

#[tokio::test]
async fn cached_page_matches_fresh_query() {
    let h = Harness::new();
    let a = h.user("a").await;
    for i in 0..4 {
        h.service.publish(a.id, &format!("post {i}")).await.unwrap();
    }

    let first = h.service.timeline_page(a.id, 1, 3).await.unwrap();
    let key = CacheKey::timeline_page(a.id, 0, 3);
    assert!(h.caches.timeline.get(&key).await.unwrap().is_hit());
    let second = h.service.timeline_page(a.id, 1, 3).await.unwrap();
    let fresh = h.store.page(a.id, 0, 3).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.items, fresh);
}

#[tokio::test]
async fn pages_are_cached_per_window() {
    let h = Harness::new();
    let a = h.user("a").await;
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(h.service.publish(a.id, &format!("post {i}")).await.unwrap().id);
    }
    ids.reverse();

    assert_eq!(h.page_post_ids(a.id, 1, 2).await, ids[0..2].to_vec());
    assert_eq!(h.page_post_ids(a.id, 1, 4).await, ids[0..4].to_vec());
    assert_eq!(h.page_post_ids(a.id, 2, 2).await, ids[2..4].to_vec());
    assert_eq!(h.page_post_ids(a.id, 3, 2).await, ids[4..5].to_vec());
    assert!(h.page_post_ids(a.id, 4, 2).await.is_empty());
}

#[tokio::test]
async fn publish_invalidates_cached_follower_pages() {
    let h = Harness::new();
    let author = h.user("author").await;
    let reader = h.user("reader").await;
    h.service.follow(reader.id, author.id).await.unwrap();

    assert!(h.page_post_ids(reader.id, 1, 15).await.is_empty());
    assert!(h.page_post_ids(reader.id, 1, 5).await.is_empty());

    let post = h.service.publish(author.id, "fresh").await.unwrap();

    assert_eq!(h.page_post_ids(reader.id, 1, 15).await, vec![post.id]);
    assert_eq!(h.page_post_ids(reader.id, 1, 5).await, vec![post.id]);
}

#[tokio::test]
async fn timeline_page_carries_user_and_followers() {
    let h = Harness::new();
    let a = h.user("a").await;
    let b = h.user("b").await;
    h.service.follow(b.id, a.id).await.unwrap();
    h.service.publish(a.id, "hi").await.unwrap();

    let page = h.service.timeline_page(a.id, 1, 15).await.unwrap();

    assert_eq!(page.user.id, a.id);
    assert_eq!(page.user.post_count, 1);
    assert_eq!(page.user.follower_count, 1);
    assert_eq!(page.followers.len(), 1);
    assert_eq!(page.followers[0].id, b.id);
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 15);
}

#[tokio::test]
async fn failed_follower_write_does_not_fail_publish() {
    let h = Harness::new();
    let author = h.user("author").await;
    let healthy = h.user("healthy").await;
    let broken = h.user("broken").await;
    h.service.follow(healthy.id, author.id).await.unwrap();
    h.service.follow(broken.id, author.id).await.unwrap();

    h.store.fail_timeline_writes_for(broken.id, 10).await;
    let post = h.service.publish(author.id, "partial").await.unwrap();

    assert_eq!(h.page_post_ids(author.id, 1, 15).await, vec![post.id]);
    assert_eq!(h.page_post_ids(healthy.id, 1, 15).await, vec![post.id]);
    assert!(h.page_post_ids(broken.id, 1, 15).await.is_empty());

    // the skipped step is repaired from the follow graph
    h.store.fail_timeline_writes_for(broken.id, 0).await;
    let reconciler = TimelineReconciler::new(
        Repositories::in_memory(h.store.clone()),
        h.caches.clone(),
        30,
        100,
    );
    let report = reconciler.reconcile_all().await.unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(h.page_post_ids(broken.id, 1, 15).await, vec![post.id]);
}

#[tokio::test]
async fn failed_retract_is_repaired_by_reconciler() {
    let h = Harness::new();
    let author = h.user("author").await;
    let reader = h.user("reader").await;
    h.service.follow(reader.id, author.id).await.unwrap();
    let post = h.service.publish(author.id, "soon gone").await.unwrap();

    h.store.fail_timeline_writes_for(reader.id, 10).await;
    h.service.delete_post(author.id, post.id).await.unwrap();
    assert_eq!(h.store.timeline_entries(reader.id).await.len(), 1);
    // the page join hides the dangling entry
    assert!(h.page_post_ids(reader.id, 1, 15).await.is_empty());

    h.store.fail_timeline_writes_for(reader.id, 0).await;
    let reconciler = TimelineReconciler::new(
        Repositories::in_memory(h.store.clone()),
        h.caches.clone(),
        30,
        100,
    );
    let report = reconciler.reconcile_recipient(reader.id).await.unwrap();

    assert_eq!(report.removed, 1);
    assert!(h.store.timeline_entries(reader.id).await.is_empty());
}

#[tokio::test]
async fn cache_outage_falls_back_to_store() {
    let h = Harness::new();
    let a = h.user("a").await;
    let post = h.service.publish(a.id, "still readable").await.unwrap();

    h.kv.set_unavailable(true);

    assert_eq!(h.page_post_ids(a.id, 1, 15).await, vec![post.id]);
    let b = h.user("b").await;
    h.service.follow(b.id, a.id).await.unwrap();
    assert_eq!(h.service.follower_list(a.id).await.unwrap().len(), 1);
}
