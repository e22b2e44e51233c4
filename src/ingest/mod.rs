//! The `agg` loop: pick the stalest feed, mark it, fetch it, store its items.
//!
//! Each tick handles exactly one feed. Failures are logged at the cycle
//! boundary and the next tick acts as the retry; only a bad interval or the
//! opt-in [`PersistencePolicy::HaltAfter`] stops the loop with an error.

mod error;
mod scheduler;
mod store;

pub use error::IngestError;
pub use scheduler::{parse_interval, CycleReport, PersistencePolicy, Scheduler};
pub use store::FeedStore;
