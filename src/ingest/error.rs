use thiserror::Error;

use crate::feed::{FetchError, TimestampError};
use crate::storage::DatabaseError;

/// Everything that can end an ingestion cycle early.
///
/// Only [`IngestError::InvalidDuration`] and [`IngestError::PersistenceHalt`]
/// stop the loop; the rest are logged at the cycle boundary.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The interval string could not be turned into a positive duration
    #[error("Invalid interval '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    /// The store holds no feeds at all
    #[error("No feeds available to fetch")]
    NoFeedsAvailable,

    /// Transport, timeout, size or XML failure for the selected feed
    #[error("Fetch failed: {0}")]
    Fetch(#[source] FetchError),

    /// An item's publish date matched none of the known layouts
    #[error("Feed #{feed_id}: item '{item_title}' has an unparseable publish date")]
    UnparseableTimestamp {
        feed_id: i64,
        item_title: String,
        #[source]
        source: TimestampError,
    },

    #[error(transparent)]
    Persistence(#[from] DatabaseError),

    /// The configured number of consecutive persistence failures was reached
    #[error("Stopping after {failures} consecutive persistence failures")]
    PersistenceHalt {
        failures: u32,
        #[source]
        last: DatabaseError,
    },

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => IngestError::Cancelled,
            other => IngestError::Fetch(other),
        }
    }
}
