use std::time::Duration;

use thiserror::Error;

use crate::feed::cache::FeedCache;
use crate::feed::parser::{parse_feed, Article, ParseError};
use crate::feed::proxy::{decode_data_uri, ProxyEndpoint};
use crate::source::Source;
use crate::storage::{CacheStore, TieredCache, TransportError};

/// Default per-proxy attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default budget for one source across its whole proxy cascade.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15);
/// Default response body cap.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Accept header sent on feed requests. Some relays vary their behavior on
/// it, and a few upstreams refuse requests without an XML media type.
pub(crate) const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml, */*";

/// Errors from a single proxy attempt.
///
/// These stay internal to the cascade; callers see a [`FetchFailure`]
/// summarizing the whole run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request-level error past the connection stage
    #[error("request failed: {0}")]
    Network(String),
    /// DNS, TCP, or TLS failure before any response arrived
    #[error("connection failed: {0}")]
    Connect(String),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Attempt exceeded the per-proxy timeout
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// Response arrived but carried no usable payload
    #[error("no content received")]
    EmptyPayload,
    /// Feed payload was a data URI with unrecoverable base64
    #[error("invalid base64 payload: {0}")]
    Decode(String),
    /// Payload was not a parseable feed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Response body exceeded the configured size limit
    #[error("response exceeded {0} bytes")]
    ResponseTooLarge(usize),
    /// The offline cache store failed while reading or writing
    #[error("cache store error: {0}")]
    Store(String),
}

impl FetchError {
    /// Connection-stage failures are the signal for offline detection: when
    /// every proxy fails this way, the network itself is gone.
    fn is_connect(&self) -> bool {
        matches!(self, FetchError::Connect(_))
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout { secs } => FetchError::Timeout(secs),
            TransportError::Connect(message) => FetchError::Connect(message),
            TransportError::Network(message) => FetchError::Network(message),
            TransportError::TooLarge { limit } => FetchError::ResponseTooLarge(limit),
            TransportError::Store(message) => FetchError::Store(message),
        }
    }
}

/// Terminal outcome for a source whose fetch did not produce articles.
///
/// `Display` and `Error` are implemented by hand: `source` here is the
/// news source's name, and a derived `thiserror::Error` would treat a
/// field with that name as the error's `source()`, which `String` cannot
/// satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Every proxy failed at the connection stage.
    Offline { source: String },
    /// The proxy chain was exhausted without a successful parse.
    Exhausted {
        source: String,
        attempts: usize,
        last: String,
    },
    /// The whole-source budget ran out before any proxy answered.
    TimedOut { source: String, secs: u64 },
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Offline { source } => {
                write!(f, "{source}: all connections failed, network appears offline")
            }
            FetchFailure::Exhausted { source, last, .. } => {
                write!(f, "{source}: all proxy servers failed - {last}")
            }
            FetchFailure::TimedOut { source, secs } => {
                write!(f, "{source}: timed out after {secs}s")
            }
        }
    }
}

impl std::error::Error for FetchFailure {}

/// Outcome of fetching one source.
///
/// `error` and `articles` are mutually exclusive: a failed fetch never
/// carries partial articles.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source: Source,
    pub articles: Vec<Article>,
    pub error: Option<FetchFailure>,
}

impl FetchResult {
    pub(crate) fn success(source: Source, articles: Vec<Article>) -> Self {
        Self {
            source,
            articles,
            error: None,
        }
    }

    pub(crate) fn failure(source: Source, error: FetchFailure) -> Self {
        Self {
            source,
            articles: Vec::new(),
            error: Some(error),
        }
    }
}

/// Tunables for the fetch path, shared by the cascade and the cache policy.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Timeout for one proxy attempt, including the body read.
    pub attempt_timeout: Duration,
    /// Budget for a source's entire cascade; enforced by the refresh
    /// orchestrator, not here.
    pub source_timeout: Duration,
    pub max_body_bytes: usize,
    /// Origin header value, when a deployment needs one for its relays.
    pub origin: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            origin: None,
        }
    }
}

/// Fetches one source through the proxy cascade.
///
/// The in-process article cache is consulted first; a fresh entry short
/// circuits the network entirely. Otherwise each proxy is tried in order
/// until one yields a parseable feed. The first success is cached and
/// returned. When every proxy fails, the result carries
/// [`FetchFailure::Offline`] if all attempts died at the connection stage,
/// otherwise [`FetchFailure::Exhausted`] with the last error seen.
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `feed_cache` - In-process article cache keyed by feed URL
/// * `tiered` - Offline cache policy that performs the actual transfers
/// * `proxies` - Relay chain, tried in order
/// * `source` - The feed to fetch
/// * `opts` - Timeouts and body limits
pub async fn fetch_feed<S: CacheStore>(
    client: &reqwest::Client,
    feed_cache: &FeedCache,
    tiered: &TieredCache<S>,
    proxies: &[ProxyEndpoint],
    source: &Source,
    opts: &FetchOptions,
) -> FetchResult {
    if let Some(articles) = feed_cache.get(&source.feed_url).await {
        tracing::debug!(source = %source.name, "Serving articles from feed cache");
        return FetchResult::success(source.clone(), articles);
    }

    let mut last_error: Option<FetchError> = None;
    let mut connect_failures = 0usize;
    let mut attempts = 0usize;

    for proxy in proxies {
        attempts += 1;
        match attempt(client, tiered, proxy, source, opts).await {
            Ok(articles) => {
                let count = articles.len();
                feed_cache.put(&source.feed_url, articles.clone()).await;
                tracing::info!(
                    source = %source.name,
                    proxy = %proxy.name,
                    articles = count,
                    "Feed fetched"
                );
                return FetchResult::success(source.clone(), articles);
            }
            Err(e) => {
                if e.is_connect() {
                    connect_failures += 1;
                }
                tracing::warn!(
                    source = %source.name,
                    proxy = %proxy.name,
                    error = %e,
                    "Proxy attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    let failure = if attempts > 0 && connect_failures == attempts {
        FetchFailure::Offline {
            source: source.name.clone(),
        }
    } else {
        FetchFailure::Exhausted {
            source: source.name.clone(),
            attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no proxies configured".to_string()),
        }
    };
    tracing::error!(source = %source.name, error = %failure, "All proxies exhausted");
    FetchResult::failure(source.clone(), failure)
}

/// One proxy attempt: transfer, envelope unwrap, data-URI decode, parse.
async fn attempt<S: CacheStore>(
    client: &reqwest::Client,
    tiered: &TieredCache<S>,
    proxy: &ProxyEndpoint,
    source: &Source,
    opts: &FetchOptions,
) -> Result<Vec<Article>, FetchError> {
    let proxied = proxy.proxied_url(&source.feed_url);
    let retrieved = tiered.fetch_feed(client, &proxied, opts).await?;
    if !(200..300).contains(&retrieved.status) {
        return Err(FetchError::HttpStatus(retrieved.status));
    }
    if retrieved.served_from_cache {
        tracing::debug!(
            source = %source.name,
            proxy = %proxy.name,
            "Serving feed body from offline cache"
        );
    }

    let body = String::from_utf8_lossy(&retrieved.body);
    let payload = proxy.unwrap_payload(&body);
    if payload.trim().is_empty() {
        return Err(FetchError::EmptyPayload);
    }
    let document = decode_data_uri(&payload).map_err(|e| FetchError::Decode(e.to_string()))?;
    let articles = parse_feed(&document)?;
    Ok(articles)
}
