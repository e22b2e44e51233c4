use chrono::Utc;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::IngestError;
use super::store::FeedStore;
use crate::feed::{parse_timestamp, FeedFetcher};
use crate::storage::{DatabaseError, Feed, NewPost};

/// What to do when cycles keep failing to write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistencePolicy {
    /// Log and keep ticking
    #[default]
    Continue,
    /// Stop the loop after this many consecutive failed cycles
    HaltAfter(NonZeroU32),
}

impl PersistencePolicy {
    /// `0` means never halt.
    pub fn from_threshold(threshold: u32) -> Self {
        NonZeroU32::new(threshold).map_or(Self::Continue, Self::HaltAfter)
    }
}

/// Outcome of one successful scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// `<channel><title>` as served, which may differ from the stored name
    pub channel_title: String,
    pub http_status: u16,
    pub inserted: usize,
    /// Items whose URL the feed already had
    pub duplicates: usize,
}

/// Parse the `agg` interval (`30s`, `1m`, `1h30m`, ...).
///
/// # Errors
///
/// Returns [`IngestError::InvalidDuration`] for unparseable or zero input.
pub fn parse_interval(input: &str) -> Result<Duration, IngestError> {
    let invalid = |reason: String| IngestError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let interval = humantime::parse_duration(input.trim()).map_err(|e| invalid(e.to_string()))?;
    if interval.is_zero() {
        return Err(invalid("interval must be greater than zero".to_string()));
    }
    Ok(interval)
}

/// Single-worker ingestion loop: one feed per tick, stalest first.
pub struct Scheduler<S> {
    store: S,
    fetcher: FeedFetcher,
    policy: PersistencePolicy,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: FeedFetcher) -> Self {
        Self {
            store,
            fetcher,
            policy: PersistencePolicy::default(),
        }
    }

    pub fn with_persistence_policy(mut self, policy: PersistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tick every `interval` until `cancel` fires.
    ///
    /// The first cycle starts immediately. A cycle always runs to completion
    /// before the next tick is awaited, so at most one fetch is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::PersistenceHalt`] when the persistence policy
    /// trips. Every other cycle error is logged and the loop continues.
    pub async fn run(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut persistence_failures: u32 = 0;

        tracing::info!(
            interval = %humantime::format_duration(interval),
            "Collecting feeds"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle(cancel).await {
                Ok(report) => {
                    persistence_failures = 0;
                    tracing::info!(
                        feed_id = report.feed_id,
                        feed = %report.feed_name,
                        channel = %report.channel_title,
                        status = report.http_status,
                        inserted = report.inserted,
                        duplicates = report.duplicates,
                        "Feed collected"
                    );
                }
                Err(IngestError::Cancelled) => break,
                Err(IngestError::Persistence(e)) => {
                    persistence_failures = persistence_failures.saturating_add(1);
                    tracing::error!(
                        error = %e,
                        consecutive = persistence_failures,
                        "Ingestion cycle failed to persist"
                    );
                    if let PersistencePolicy::HaltAfter(limit) = self.policy {
                        if persistence_failures >= limit.get() {
                            return Err(IngestError::PersistenceHalt {
                                failures: persistence_failures,
                                last: e,
                            });
                        }
                    }
                }
                Err(IngestError::NoFeedsAvailable) => {
                    persistence_failures = 0;
                    tracing::warn!("No feeds to collect; add one with `gator addfeed`");
                }
                Err(e) => {
                    persistence_failures = 0;
                    tracing::warn!(error = %e, "Ingestion cycle failed");
                }
            }
        }

        tracing::info!("Feed collection stopped");
        Ok(())
    }

    /// Select the stalest feed and scrape it.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, IngestError> {
        let feed = self
            .store
            .next_feed_to_fetch()
            .await?
            .ok_or(IngestError::NoFeedsAvailable)?;
        self.scrape(&feed, cancel).await
    }

    /// Scrape the feed stored under `url` now, outside the tick schedule.
    ///
    /// # Errors
    ///
    /// An unknown URL is [`IngestError::Persistence`] with
    /// [`DatabaseError::NotFound`].
    pub async fn scrape_feed_by_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, IngestError> {
        let feed = self
            .store
            .get_feed_by_url(url)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("feed '{}'", url)))?;
        self.scrape(&feed, cancel).await
    }

    async fn scrape(
        &self,
        feed: &Feed,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, IngestError> {
        // Marked before fetching: a failing feed rotates to the back like any other
        self.store.mark_feed_fetched(feed.id, Utc::now()).await?;

        let fetched = self.fetcher.fetch(&feed.url, cancel).await?;
        if !fetched.is_success() {
            tracing::warn!(
                feed_id = feed.id,
                url = %feed.url,
                status = fetched.status,
                "Feed responded with an error status"
            );
        }

        let mut report = CycleReport {
            feed_id: feed.id,
            feed_name: feed.name.clone(),
            channel_title: fetched.document.title,
            http_status: fetched.status,
            inserted: 0,
            duplicates: 0,
        };

        for item in fetched.document.items {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let published_at = parse_timestamp(&item.pub_date).map_err(|source| {
                IngestError::UnparseableTimestamp {
                    feed_id: feed.id,
                    item_title: item.title.clone(),
                    source,
                }
            })?;

            let post = NewPost {
                feed_id: feed.id,
                title: item.title,
                url: item.link,
                description: (!item.description.is_empty()).then_some(item.description),
                published_at,
            };

            if self.store.create_post(&post).await? {
                report.inserted += 1;
            } else {
                tracing::debug!(feed_id = feed.id, url = %post.url, "Post already stored");
                report.duplicates += 1;
            }
        }

        Ok(report)
    }
}
