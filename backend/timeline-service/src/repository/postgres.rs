use super::{GraphRepository, PostRepository, TimelineRepository, UserRepository};
use crate::domain::{FollowEdge, Follower, NewPost, Post, TimelineEntry, TimelineItem, User};
use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// PostgreSQL implementation of every engine repository
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserRepository for PostgresStore {
    async fn get_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, account, avatar,
                   following_num AS following_count,
                   follower_num AS follower_count,
                   weibo_num AS post_count,
                   created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_user_ids(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE id > $1 ORDER BY id ASC LIMIT $2",
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn adjust_following_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET following_num = GREATEST(following_num + $2, 0) WHERE id = $1",
        )
        .bind(user_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_follower_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET follower_num = GREATEST(follower_num + $2, 0) WHERE id = $1",
        )
        .bind(user_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_post_count(&self, user_id: i64, delta: i32) -> StoreResult<()> {
        sqlx::query("UPDATE users SET weibo_num = GREATEST(weibo_num + $2, 0) WHERE id = $1")
            .bind(user_id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl GraphRepository for PostgresStore {
    async fn get_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> StoreResult<Option<FollowEdge>> {
        let edge = sqlx::query_as::<_, FollowEdge>(
            r#"
            SELECT from_user_id AS follower_id, to_user_id AS followee_id, created_at
            FROM following
            WHERE from_user_id = $1 AND to_user_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(edge)
    }

    async fn create_follow_edge(
        &self,
        follower_id: i64,
        followee_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO following (from_user_id, to_user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (from_user_id, to_user_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        debug!(follower_id, followee_id, created, "Create follow edge");
        Ok(created)
    }

    async fn delete_follow_edge(&self, follower_id: i64, followee_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM following WHERE from_user_id = $1 AND to_user_id = $2")
                .bind(follower_id)
                .bind(followee_id)
                .execute(&self.pool)
                .await?;

        let deleted = result.rows_affected() > 0;
        debug!(follower_id, followee_id, deleted, "Delete follow edge");
        Ok(deleted)
    }

    async fn list_followers(&self, user_id: i64) -> StoreResult<Vec<Follower>> {
        let followers = sqlx::query_as::<_, Follower>(
            r#"
            SELECT u.id, u.account, u.avatar
            FROM following f
            JOIN users u ON u.id = f.from_user_id
            WHERE f.to_user_id = $1
            ORDER BY f.created_at ASC, f.from_user_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }

    async fn list_following_ids(&self, user_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT to_user_id FROM following WHERE from_user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait::async_trait]
impl PostRepository for PostgresStore {
    async fn insert_post(&self, post: &NewPost) -> StoreResult<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO weibos (user_id, account, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id AS author_id, account, content,
                      like_num AS like_count, comment_num AS comment_count, created_at
            "#,
        )
        .bind(post.author_id)
        .bind(&post.account)
        .bind(&post.content)
        .bind(post.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(post)
    }

    async fn get_post(&self, post_id: i64) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id AS author_id, account, content,
                   like_num AS like_count, comment_num AS comment_count, created_at
            FROM weibos
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn delete_post(&self, post_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM weibos WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_posts_by_author(&self, author_id: i64, limit: i64) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, user_id AS author_id, account, content,
                   like_num AS like_count, comment_num AS comment_count, created_at
            FROM weibos
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }
}

#[async_trait::async_trait]
impl TimelineRepository for PostgresStore {
    async fn insert_entry(&self, entry: &TimelineEntry) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO timeline (user_id, weibo_user_id, weibo_id, weibo_created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, weibo_id) DO NOTHING
            "#,
        )
        .bind(entry.recipient_id)
        .bind(entry.author_id)
        .bind(entry.post_id)
        .bind(entry.post_created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_self_entries(
        &self,
        user_id: i64,
        limit: i64,
    ) -> StoreResult<Vec<TimelineEntry>> {
        let entries = sqlx::query_as::<_, TimelineEntry>(
            r#"
            SELECT user_id AS recipient_id, weibo_user_id AS author_id,
                   weibo_id AS post_id, weibo_created_at AS post_created_at
            FROM timeline
            WHERE user_id = $1 AND weibo_user_id = $1
            ORDER BY weibo_created_at DESC, weibo_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn delete_entry(&self, recipient_id: i64, post_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM timeline WHERE user_id = $1 AND weibo_id = $2")
            .bind(recipient_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_entries_by_author(
        &self,
        recipient_id: i64,
        author_id: i64,
    ) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM timeline WHERE user_id = $1 AND weibo_user_id = $2")
                .bind(recipient_id)
                .bind(author_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn page(
        &self,
        recipient_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<TimelineItem>> {
        let items = sqlx::query_as::<_, TimelineItem>(
            r#"
            SELECT w.id AS post_id, w.user_id AS author_id, w.account, u.avatar,
                   w.content, w.like_num AS like_count, w.comment_num AS comment_count,
                   w.created_at
            FROM timeline t
            JOIN weibos w ON w.id = t.weibo_id
            JOIN users u ON u.id = w.user_id
            WHERE t.user_id = $1
            ORDER BY t.weibo_created_at DESC, t.weibo_id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipient_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn entry_authors(&self, recipient_id: i64) -> StoreResult<Vec<i64>> {
        let authors = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT weibo_user_id FROM timeline WHERE user_id = $1",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(authors)
    }

    async fn delete_orphaned_entries(&self, recipient_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM timeline t
            WHERE t.user_id = $1
              AND NOT EXISTS (SELECT 1 FROM weibos w WHERE w.id = t.weibo_id)
            "#,
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
