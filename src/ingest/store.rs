use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::storage::{Database, DatabaseError, Feed, NewPost};

/// The slice of persistence the scheduler needs.
///
/// [`Database`] is the production implementation; tests swap in stores that
/// record calls or fail on demand.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Least recently fetched feed, never-fetched first, ties by id.
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError>;

    async fn mark_feed_fetched(&self, feed_id: i64, now: DateTime<Utc>)
        -> Result<(), DatabaseError>;

    /// `true` if inserted, `false` if the feed already had a post at that URL.
    async fn create_post(&self, post: &NewPost) -> Result<bool, DatabaseError>;

    async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id, now).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<bool, DatabaseError> {
        Database::create_post(self, post).await
    }

    async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        Database::get_feed_by_url(self, url).await
    }
}
