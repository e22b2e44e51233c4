use chrono::{DateTime, Utc};

use super::follows::insert_follow;
use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedFollow, FeedListing, FeedRow};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Add a feed owned by `user_id` and follow it on the owner's behalf.
    ///
    /// Both rows are written in one transaction: a feed never exists without
    /// its creator's follow.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Conflict` if a feed with this URL exists.
    pub async fn create_feed(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<(Feed, FeedFollow), DatabaseError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let row: FeedRow = sqlx::query_as(&format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            FEED_COLUMNS
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::conflict_or(e, format!("feed '{}'", url)))?;

        let follow = insert_follow(&mut tx, user_id, row.id).await?;
        tx.commit().await?;

        Ok((row.into_feed(), follow))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds WHERE url = ?", FEED_COLUMNS))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(FeedRow::into_feed))
    }

    /// All feeds in insertion order.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> =
            sqlx::query_as(&format!("SELECT {} FROM feeds ORDER BY id", FEED_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// All feeds with the name of the user who added each one.
    pub async fn list_feeds_with_creators(&self) -> Result<Vec<FeedListing>, DatabaseError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
                SELECT f.name, f.url, u.name
                FROM feeds f
                JOIN users u ON u.id = f.user_id
                ORDER BY f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, url, creator_name)| FeedListing {
                name,
                url,
                creator_name,
            })
            .collect())
    }

    // ========================================================================
    // Scheduling Operations
    // ========================================================================

    /// The feed that has gone longest without a fetch.
    ///
    /// Never-fetched feeds come first; ties are broken by id so selection is
    /// deterministic.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            "SELECT {} FROM feeds
             ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC
             LIMIT 1",
            FEED_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FeedRow::into_feed))
    }

    /// Record that `feed_id` was picked for fetching at `now`.
    ///
    /// `last_fetched_at` never moves backwards: an older `now` leaves the
    /// stored instant alone.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if no feed has this id.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let now = now.timestamp();
        let result = sqlx::query(
            r#"
                UPDATE feeds SET
                    last_fetched_at = CASE
                        WHEN last_fetched_at IS NULL OR last_fetched_at < ?1 THEN ?1
                        ELSE last_fetched_at
                    END,
                    updated_at = MAX(updated_at, ?1)
                WHERE id = ?2
            "#,
        )
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed #{}", feed_id)));
        }
        Ok(())
    }
}
