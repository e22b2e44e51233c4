use sqlx::SqliteConnection;

use super::schema::Database;
use super::types::{DatabaseError, FeedFollow, FeedFollowRow};

/// Insert a follow and read it back with the user and feed names.
///
/// Takes a bare connection so `create_feed` can run it inside its own
/// transaction.
pub(super) async fn insert_follow(
    conn: &mut SqliteConnection,
    user_id: i64,
    feed_id: i64,
) -> Result<FeedFollow, DatabaseError> {
    let now = chrono::Utc::now().timestamp();
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(feed_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| DatabaseError::conflict_or(e, "feed follow"))?;

    let row: FeedFollowRow = sqlx::query_as(
        r#"
            SELECT ff.id, ff.user_id, ff.feed_id, ff.created_at, ff.updated_at,
                   u.name AS user_name, f.name AS feed_name
            FROM feed_follows ff
            JOIN users u ON u.id = ff.user_id
            JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
        "#,
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into_follow())
}

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Conflict` if the user already follows the feed.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        insert_follow(&mut conn, user_id, feed_id).await
    }

    /// Remove a follow.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the user was not following the feed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "follow of feed #{} by user #{}",
                feed_id, user_id
            )));
        }
        Ok(())
    }

    /// Names of the feeds `user_id` follows, oldest follow first.
    pub async fn list_feed_follows(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
                SELECT f.name
                FROM feed_follows ff
                JOIN feeds f ON f.id = ff.feed_id
                WHERE ff.user_id = ?
                ORDER BY ff.created_at, ff.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
