//! Feed retrieval and parsing.
//!
//! This module turns a configured news source into displayable articles:
//!
//! - **Parsing**: Convert RSS/Atom XML into structured article data
//! - **Fetching**: Proxy-relayed HTTP retrieval with failover and offline fallback
//! - **Images**: Best-effort lead image extraction from feed entries
//!
//! # Architecture
//!
//! The module is organized into five submodules:
//!
//! - [`parser`] - Feed XML parsing into [`Article`] values
//! - [`fetcher`] - The per-source fetch cascade across relay proxies
//! - [`image`] - Lead image candidate selection
//! - [`proxy`] - Relay endpoint definitions and payload unwrapping
//! - [`cache`] - In-memory article cache that absorbs repeat refreshes
//!
//! # Example
//!
//! ```ignore
//! use newsrack::feed::{fetch_feed, FeedCache, FetchOptions};
//!
//! let result = fetch_feed(&client, &feed_cache, &tiered, &proxies, &source, &opts).await;
//! for article in &result.articles {
//!     println!("{}: {}", article.display_date, article.title);
//! }
//! ```

mod cache;
pub(crate) mod fetcher;
mod image;
mod parser;
mod proxy;

pub use cache::{FeedCache, DEFAULT_FEED_TTL};
pub use fetcher::{
    fetch_feed, FetchError, FetchFailure, FetchOptions, FetchResult, DEFAULT_ATTEMPT_TIMEOUT,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_SOURCE_TIMEOUT,
};
pub use parser::{parse_feed, Article, FeedFormat, ParseError, MAX_ARTICLES_PER_FEED};
pub use proxy::{default_proxies, proxy_image_url, ProxyEndpoint, ProxyKind};
