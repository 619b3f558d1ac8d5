use super::{GraphRepository, PostRepository, TimelineRepository, UserRepository};
use crate::domain::{FollowEdge, Follower, NewPost, Post, TimelineEntry, TimelineItem, User};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_user_id: i64,
    next_post_id: i64,
    users: BTreeMap<i64, User>,
    /// Insertion order is follower-list order
    edges: Vec<FollowEdge>,
    posts: BTreeMap<i64, Post>,
    /// Keyed by (recipient, post)
    timeline: HashMap<(i64, i64), TimelineEntry>,
    /// Remaining injected timeline write failures per recipient
    timeline_faults: HashMap<i64, u32>,
}

impl State {
    fn take_timeline_fault(&mut self, recipient_id: i64) -> StoreResult<()> {
        match self.timeline_faults.get_mut(&recipient_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!(
                    "injected timeline write failure for recipient {recipient_id}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory implementation of every engine repository.
///
/// Used by tests and embedders. Mirrors the PostgreSQL semantics: edge and
/// timeline inserts are conditional, counters clamp at zero, timeline rows
/// are not cascaded when a post is deleted.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fail_post_inserts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user; stands in for the registration flow
    pub async fn create_user(&self, account: &str, avatar: &str) -> User {
        let mut state = self.state.write().await;
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            account: account.to_string(),
            avatar: avatar.to_string(),
            following_count: 0,
            follower_count: 0,
            post_count: 0,
            created_at: Utc::now().trunc_subsecs(6),
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Make every post insert fail until reset
    pub fn fail_post_inserts(&self, fail: bool) {
        self.fail_post_inserts.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `times` timeline writes targeting `recipient_id`
    pub async fn fail_timeline_writes_for(&self, recipient_id: i64, times: u32) {
        self.state
            .write()
            .await
            .timeline_faults
            .insert(recipient_id, times);
    }

    /// Raw entries of one recipient, newest first
    pub async fn timeline_entries(&self, recipient_id: i64) -> Vec<TimelineEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<TimelineEntry> = state
            .timeline
            .values()
            .filter(|e| e.recipient_id == recipient_id)
            .cloned()
            .collect();
        sort_newest_first(&mut entries);
        entries
    }

    pub async fn timeline_len(&self) -> usize {
        self.state.read().await.timeline.len()
    }
}

fn sort_newest_first(entries: &mut [TimelineEntry]) {
    entries.sort_by(|a, b| {
        b.post_created_at
            .cmp(&a.post_created_at)
            .then(b.post_id.cmp(&a.post_id))
    });
}

fn clamp_add(value: i32, delta: i32) -> i32 {
    value.saturating_add(delta).max(0)
}

#[async_trait::async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn list_user_ids(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .range(after + 1..)
            .take(limit.max(0) as usize)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn adjust_following_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.following_count = clamp_add(user.following_count, delta);
        }
        Ok(())
    }

    async fn adjust_follower_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.follower_count = clamp_add(user.follower_count, delta);
        }
        Ok(())
    }

    async fn adjust_post_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.post_count = clamp_add(user.post_count, delta);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GraphRepository for InMemoryStore {
    async fn get_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> StoreResult<Option<FollowEdge>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .find(|e| e.follower_id == follower_id && e.followee_id == followee_id)
            .cloned())
    }

    async fn create_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state
            .edges
            .iter()
            .any(|e| e.follower_id == follower_id && e.followee_id == followee_id)
        {
            return Ok(false);
        }
        state.edges.push(FollowEdge {
            follower_id,
            followee_id,
            created_at,
        });
        Ok(true)
    }

    async fn delete_follow_edge(&self, follower_id: i64, followee_id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let before = state.edges.len();
        state
            .edges
            .retain(|e| !(e.follower_id == follower_id && e.followee_id == followee_id));
        Ok(state.edges.len() < before)
    }

    async fn list_followers(&self, user_id: i64) -> StoreResult<Vec<Follower>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| e.followee_id == user_id)
            .filter_map(|e| state.users.get(&e.follower_id))
            .map(|u| Follower {
                id: u.id,
                account: u.account.clone(),
                avatar: u.avatar.clone(),
            })
            .collect())
    }

    async fn list_following_ids(&self, user_id: i64) -> StoreResult<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| e.follower_id == user_id)
            .map(|e| e.followee_id)
            .collect())
    }
}

#[async_trait::async_trait]
impl PostRepository for InMemoryStore {
    async fn insert_post(&self, post: &NewPost) -> StoreResult<Post> {
        if self.fail_post_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected post insert failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        state.next_post_id += 1;
        let post = Post {
            id: state.next_post_id,
            author_id: post.author_id,
            account: post.account.clone(),
            content: post.content.clone(),
            like_count: 0,
            comment_count: 0,
            created_at: post.created_at,
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, post_id: i64) -> StoreResult<Option<Post>> {
        Ok(self.state.read().await.posts.get(&post_id).cloned())
    }

    async fn delete_post(&self, post_id: i64) -> StoreResult<bool> {
        Ok(self.state.write().await.posts.remove(&post_id).is_some())
    }

    async fn recent_posts_by_author(&self, author_id: i64, limit: i64) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts.truncate(limit.max(0) as usize);
        Ok(posts)
    }
}

#[async_trait::async_trait]
impl TimelineRepository for InMemoryStore {
    async fn insert_entry(&self, entry: &TimelineEntry) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.take_timeline_fault(entry.recipient_id)?;

        let key = (entry.recipient_id, entry.post_id);
        if state.timeline.contains_key(&key) {
            return Ok(false);
        }
        state.timeline.insert(key, entry.clone());
        Ok(true)
    }

    async fn recent_self_entries(
        &self,
        user_id: i64,
        limit: i64,
    ) -> StoreResult<Vec<TimelineEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<TimelineEntry> = state
            .timeline
            .values()
            .filter(|e| e.recipient_id == user_id && e.author_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut entries);
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn delete_entry(&self, recipient_id: i64, post_id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.take_timeline_fault(recipient_id)?;
        Ok(state.timeline.remove(&(recipient_id, post_id)).is_some())
    }

    async fn delete_entries_by_author(
        &self,
        recipient_id: i64,
        author_id: i64,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        state.take_timeline_fault(recipient_id)?;
        let before = state.timeline.len();
        state
            .timeline
            .retain(|_, e| !(e.recipient_id == recipient_id && e.author_id == author_id));
        Ok((before - state.timeline.len()) as u64)
    }

    async fn page(
        &self,
        recipient_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<TimelineItem>> {
        let state = self.state.read().await;
        let mut entries: Vec<&TimelineEntry> = state
            .timeline
            .values()
            .filter(|e| e.recipient_id == recipient_id)
            .collect();
        entries.sort_by(|a, b| {
            b.post_created_at
                .cmp(&a.post_created_at)
                .then(b.post_id.cmp(&a.post_id))
        });

        Ok(entries
            .into_iter()
            .filter_map(|e| {
                let post = state.posts.get(&e.post_id)?;
                let author = state.users.get(&post.author_id)?;
                Some(TimelineItem {
                    post_id: post.id,
                    author_id: post.author_id,
                    account: post.account.clone(),
                    avatar: author.avatar.clone(),
                    content: post.content.clone(),
                    like_count: post.like_count,
                    comment_count: post.comment_count,
                    created_at: post.created_at,
                })
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn entry_authors(&self, recipient_id: i64) -> StoreResult<Vec<i64>> {
        let state = self.state.read().await;
        let authors: BTreeSet<i64> = state
            .timeline
            .values()
            .filter(|e| e.recipient_id == recipient_id)
            .map(|e| e.author_id)
            .collect();
        Ok(authors.into_iter().collect())
    }

    async fn delete_orphaned_entries(&self, recipient_id: i64) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let State {
            timeline, posts, ..
        } = &mut *state;
        let before = timeline.len();
        timeline.retain(|_, e| e.recipient_id != recipient_id || posts.contains_key(&e.post_id));
        Ok((before - timeline.len()) as u64)
    }
}
