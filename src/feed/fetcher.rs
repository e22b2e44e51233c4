use crate::feed::parser::{parse_feed, FeedDocument, ParseError};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// `User-Agent` sent with every feed request unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing a feed.
///
/// There is no status variant: a non-2xx response is still parsed and its
/// status handed back in [`FetchedFeed`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The caller cancelled the fetch
    #[error("Fetch cancelled")]
    Cancelled,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not a readable RSS document
    #[error("Malformed feed: {0}")]
    Malformed(#[from] ParseError),
}

/// A parsed feed together with the status code it was served with.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub status: u16,
    pub document: FeedDocument,
}

impl FetchedFeed {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP side of ingestion: one GET, full body, then parse.
///
/// No retries and no shared state; the scheduler's next tick is the retry.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Build a fetcher that identifies itself with `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built
    /// (e.g. TLS backend initialisation failure).
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client, timeout })
    }

    /// Fetch `url` and parse the body as RSS.
    ///
    /// The request is abandoned as soon as `cancel` fires; nothing partial is
    /// returned in that case.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request exceeded the configured timeout
    /// - [`FetchError::Cancelled`] - `cancel` fired before the body was parsed
    /// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
    /// - [`FetchError::Malformed`] - Invalid or empty RSS XML
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedFeed, FetchError> {
        let (status, bytes) = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(FetchError::Cancelled),

            result = tokio::time::timeout(self.timeout, self.download(url)) => {
                result.map_err(|_| FetchError::Timeout(self.timeout))??
            }
        };

        if status >= 400 {
            tracing::debug!(url = %url, status, "Parsing body of unsuccessful response");
        }

        let document = parse_feed(&bytes)?;
        Ok(FetchedFeed { status, document })
    }

    async fn download(&self, url: &str) -> Result<(u16, Vec<u8>), FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        Ok((status, bytes))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
