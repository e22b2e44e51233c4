use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post, PostRow};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post, ignoring it if the feed already has one with this URL.
    ///
    /// Returns `true` if a row was inserted, `false` for a duplicate.
    pub async fn create_post(&self, post: &NewPost) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
                INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(feed_id, url) DO NOTHING
            "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(post.description.as_deref())
        .bind(post.published_at.timestamp())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Newest posts across every feed `user_id` follows.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
                SELECT p.id, p.feed_id, p.title, p.url, p.description,
                       p.published_at, p.created_at, p.updated_at
                FROM posts p
                JOIN feed_follows ff ON ff.feed_id = p.feed_id
                WHERE ff.user_id = ?
                ORDER BY p.published_at DESC, p.id DESC
                LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Every post of one feed, in insertion order.
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
                SELECT id, feed_id, title, url, description,
                       published_at, created_at, updated_at
                FROM posts
                WHERE feed_id = ?
                ORDER BY id
            "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }
}
