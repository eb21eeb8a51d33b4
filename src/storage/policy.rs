use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::header;
use thiserror::Error;

use super::store::{CacheStore, CachedResponse};
use crate::feed::fetcher::{FetchOptions, FEED_ACCEPT};

// ============================================================================
// Cache Classes
// ============================================================================

/// How long a static asset stays fresh (30 days).
const STATIC_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// How long a cached article image stays fresh (7 days).
const IMAGE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// How long a cached feed body stays fresh (5 minutes).
const FEED_TTL: Duration = Duration::from_secs(5 * 60);

/// The three classes of cached response, each with its own namespace and
/// freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    Static,
    Images,
    Feeds,
}

impl CacheClass {
    pub(crate) const ALL: [CacheClass; 3] =
        [CacheClass::Static, CacheClass::Images, CacheClass::Feeds];

    pub fn namespace(self) -> &'static str {
        match self {
            CacheClass::Static => "static",
            CacheClass::Images => "images",
            CacheClass::Feeds => "feeds",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            CacheClass::Static => STATIC_TTL,
            CacheClass::Images => IMAGE_TTL,
            CacheClass::Feeds => FEED_TTL,
        }
    }
}

// ============================================================================
// Transfer Types
// ============================================================================

/// Errors from a single HTTP transfer through the tiered cache.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response headers arrived within the attempt timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The connection itself could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request failed after connecting (DNS, TLS, mid-body resets).
    #[error("request failed: {0}")]
    Network(String),

    /// The response body exceeded the configured size limit.
    #[error("response exceeded {limit} bytes")]
    TooLarge { limit: usize },

    /// The backing cache store failed.
    #[error("cache store error: {0}")]
    Store(String),
}

/// A response delivered by the tiered cache, from the network or from a
/// stored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// True when the body came out of the cache store rather than the
    /// network.
    pub served_from_cache: bool,
}

impl Retrieved {
    fn from_cache(record: CachedResponse) -> Self {
        Self {
            status: record.status,
            content_type: record.content_type,
            body: record.body,
            served_from_cache: true,
        }
    }
}

/// Counters reported by one sweep over the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    /// Entries inspected across all namespaces.
    pub examined: usize,
    /// Stale entries deleted.
    pub removed: usize,
}

// ============================================================================
// Tiered Cache
// ============================================================================

/// HTTP fetch layer that pairs every transfer with a cache namespace.
///
/// Static assets and images are served cache-first: a fresh stored copy
/// short-circuits the network entirely, and a stale copy of any age is
/// served when the network fails. Feed bodies are served network-first:
/// the network is always tried so readers see new stories, and the stored
/// copy (any age) only backs up connection and read failures. Timeouts
/// and oversized bodies are reported as errors without a cache fallback,
/// so a hung proxy fails over to the next one instead of pinning readers
/// to old news.
pub struct TieredCache<S> {
    store: S,
}

impl<S: CacheStore> TieredCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store, for seeding and inspection.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch an application asset, cache-first with a 30 day freshness
    /// window.
    pub async fn fetch_static(
        &self,
        client: &reqwest::Client,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Retrieved, TransportError> {
        self.cache_first(CacheClass::Static, client, url, opts).await
    }

    /// Fetch an article image, cache-first with a 7 day freshness window.
    pub async fn fetch_image(
        &self,
        client: &reqwest::Client,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Retrieved, TransportError> {
        self.cache_first(CacheClass::Images, client, url, opts).await
    }

    /// Fetch a feed body, network-first.
    ///
    /// Success responses are stored for offline fallback. Error statuses
    /// pass through uncached so the caller can fail over to another
    /// proxy. Only connection and read failures fall back to a stored
    /// copy; timeouts do not, matching the abort semantics of a hung
    /// transfer.
    pub async fn fetch_feed(
        &self,
        client: &reqwest::Client,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Retrieved, TransportError> {
        let class = CacheClass::Feeds;
        match self.transfer(class, client, url, opts).await {
            Ok(retrieved) => {
                self.store_success(class, url, &retrieved).await;
                Ok(retrieved)
            }
            Err(e) if matches!(e, TransportError::Connect(_) | TransportError::Network(_)) => {
                match self.store.find(class.namespace(), url).await {
                    Ok(Some(record)) => {
                        tracing::info!(url = %url, "Network failed, serving cached feed body");
                        Ok(Retrieved::from_cache(record))
                    }
                    Ok(None) => Err(e),
                    Err(store_err) => {
                        tracing::warn!(url = %url, error = %store_err, "Cache lookup failed during offline fallback");
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every stale entry in every namespace.
    ///
    /// Store failures are logged and skipped so one bad namespace does
    /// not abort the sweep.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        for class in CacheClass::ALL {
            let namespace = class.namespace();
            let keys = match self.store.keys(namespace).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(namespace = namespace, error = %e, "Cache sweep could not list entries");
                    continue;
                }
            };

            for url in keys {
                stats.examined += 1;
                let record = match self.store.find(namespace, &url).await {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(namespace = namespace, url = %url, error = %e, "Cache sweep could not read entry");
                        continue;
                    }
                };

                if !is_fresh(&record, class.ttl()) {
                    match self.store.delete(namespace, &url).await {
                        Ok(()) => stats.removed += 1,
                        Err(e) => {
                            tracing::warn!(namespace = namespace, url = %url, error = %e, "Failed to evict stale cache entry");
                        }
                    }
                }
            }
        }

        if stats.removed > 0 {
            tracing::info!(
                examined = stats.examined,
                removed = stats.removed,
                "Cache sweep complete"
            );
        }
        stats
    }

    async fn cache_first(
        &self,
        class: CacheClass,
        client: &reqwest::Client,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Retrieved, TransportError> {
        let cached = self
            .store
            .find(class.namespace(), url)
            .await
            .map_err(|e| TransportError::Store(e.to_string()))?;

        if let Some(record) = &cached {
            if is_fresh(record, class.ttl()) {
                return Ok(Retrieved::from_cache(record.clone()));
            }
        }

        match self.transfer(class, client, url, opts).await {
            Ok(retrieved) => {
                self.store_success(class, url, &retrieved).await;
                Ok(retrieved)
            }
            Err(e)
                if matches!(
                    e,
                    TransportError::Connect(_)
                        | TransportError::Network(_)
                        | TransportError::Timeout { .. }
                ) =>
            {
                // A stale copy of any age beats a network error.
                if let Some(record) = cached {
                    tracing::debug!(url = %url, "Serving stale cache entry after network failure");
                    return Ok(Retrieved::from_cache(record));
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// One network transfer with timeout and body size enforcement.
    async fn transfer(
        &self,
        class: CacheClass,
        client: &reqwest::Client,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Retrieved, TransportError> {
        let mut request = client.get(url);
        if class == CacheClass::Feeds {
            request = request.header(header::ACCEPT, FEED_ACCEPT);
            if let Some(origin) = &opts.origin {
                request = request.header(header::ORIGIN, origin.as_str());
            }
        }

        let response = tokio::time::timeout(opts.attempt_timeout, request.send())
            .await
            .map_err(|_| TransportError::Timeout {
                secs: opts.attempt_timeout.as_secs(),
            })?
            .map_err(classify_reqwest)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_limited_bytes(response, opts.max_body_bytes).await?;

        Ok(Retrieved {
            status,
            content_type,
            body,
            served_from_cache: false,
        })
    }

    /// Stores a 200 response for later offline use. Error statuses are
    /// never cached. Store failures degrade to a warning so a broken
    /// cache does not fail a successful fetch.
    async fn store_success(&self, class: CacheClass, url: &str, retrieved: &Retrieved) {
        if retrieved.status != 200 {
            return;
        }
        let record = CachedResponse {
            url: url.to_string(),
            status: retrieved.status,
            content_type: retrieved.content_type.clone(),
            body: retrieved.body.clone(),
            cached_at: Utc::now(),
        };
        if let Err(e) = self.store.put(class.namespace(), record).await {
            tracing::warn!(namespace = class.namespace(), url = %url, error = %e, "Failed to cache response");
        }
    }
}

fn classify_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// A record is fresh while its age is strictly below the class TTL.
fn is_fresh(record: &CachedResponse, ttl: Duration) -> bool {
    match Utc::now().signed_duration_since(record.cached_at).to_std() {
        Ok(age) => age < ttl,
        // cached_at is in the future (clock adjustment); treat as fresh.
        Err(_) => true,
    }
}

/// Read a response body while enforcing a byte limit.
///
/// Checks Content-Length first to reject oversized responses before
/// transfer, then enforces the limit while streaming for responses that
/// do not declare a length.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    if let Some(length) = response.content_length() {
        if length as usize > limit {
            return Err(TransportError::TooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransportError::Network(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::TooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
