use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use timeline_cache::{
    ttl, CacheKey, CacheLookup, InMemoryKvStore, KvStore, ReadThroughCache, TIMELINE_NAMESPACE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    id: i64,
    account: String,
    content: String,
    like_count: i32,
    created_at: DateTime<Utc>,
}

fn rows() -> Vec<Row> {
    vec![
        Row {
            id: 2,
            account: "alice".into(),
            content: "second \u{1F600} with \"quotes\"".into(),
            like_count: 3,
            created_at: Utc.timestamp_opt(1_700_000_100, 123_456_000).unwrap(),
        },
        Row {
            id: 1,
            account: "alice".into(),
            content: String::new(),
            like_count: 0,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        },
    ]
}

#[tokio::test]
async fn cached_rows_match_loaded_rows_field_for_field() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let cache: ReadThroughCache<Vec<Row>> = ReadThroughCache::new(
        store,
        TIMELINE_NAMESPACE,
        Duration::from_secs(ttl::TIMELINE_PAGE),
    );
    let key = CacheKey::timeline_page(1, 0, 15);

    let loaded: Result<_, String> = cache.get_or_load(&key, || async { Ok(rows()) }).await;
    let cached = cache.get(&key).await.unwrap();

    assert_eq!(loaded.unwrap(), rows());
    assert_eq!(cached, CacheLookup::Hit(rows()));
}

#[tokio::test(start_paused = true)]
async fn follower_entries_expire_after_ttl() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let cache: ReadThroughCache<Vec<i64>> =
        ReadThroughCache::new(store, "followers", Duration::from_secs(ttl::FOLLOWERS));
    let key = CacheKey::followers(9);
    cache.put(&key, &vec![1, 2]).await.unwrap();

    tokio::time::advance(Duration::from_secs(ttl::FOLLOWERS - 1)).await;
    assert!(cache.get(&key).await.unwrap().is_hit());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&key).await.unwrap(), CacheLookup::Miss);
}

#[tokio::test]
async fn prefix_invalidation_purges_every_window_of_one_recipient() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let cache: ReadThroughCache<Vec<i64>> =
        ReadThroughCache::new(store, TIMELINE_NAMESPACE, Duration::from_secs(60));
    cache.put(&CacheKey::timeline_page(1, 0, 15), &vec![1]).await.unwrap();
    cache.put(&CacheKey::timeline_page(1, 15, 15), &vec![2]).await.unwrap();
    cache.put(&CacheKey::timeline_page(2, 0, 15), &vec![3]).await.unwrap();

    let purged = cache
        .invalidate_prefix(&CacheKey::timeline_prefix(1))
        .await
        .unwrap();

    assert_eq!(purged, 2);
    assert!(cache
        .get(&CacheKey::timeline_page(2, 0, 15))
        .await
        .unwrap()
        .is_hit());
}
