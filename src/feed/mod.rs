//! Everything between a feed URL and a list of dated items.
//!
//! - [`fetcher`] - one HTTP GET per feed, full body, no retries
//! - [`parser`] - RSS 2.0 XML into a [`FeedDocument`], HTML entities decoded
//! - [`timestamp`] - ordered multi-layout parsing of `<pubDate>` strings
//! - [`validate`] - URL checks applied before a feed is stored
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{parse_timestamp, FeedFetcher, DEFAULT_USER_AGENT};
//!
//! let fetcher = FeedFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(30))?;
//! let fetched = fetcher.fetch("https://blog.boot.dev/index.xml", &cancel).await?;
//! for item in &fetched.document.items {
//!     let published = parse_timestamp(&item.pub_date)?;
//! }
//! ```

pub mod fetcher;
pub mod parser;
pub mod timestamp;
mod validate;

pub use fetcher::{FeedFetcher, FetchError, FetchedFeed, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use parser::{parse_feed, unescape_entities, FeedDocument, FeedItem, ParseError};
pub use timestamp::{parse_timestamp, parse_timestamp_with_layout, Layout, TimestampError};
pub use validate::{validate_feed_url, UrlValidationError};
