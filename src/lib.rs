//! Resilient RSS/Atom news aggregation.
//!
//! newsrack refreshes a line-up of news sources through a cascade of CORS
//! relay proxies, parses each feed into display-ready articles, and backs
//! every transfer with a tiered response cache so readers keep their news
//! when the network goes away.
//!
//! - [`source`] - The configured news sources
//! - [`feed`] - Fetching, parsing, and lead image extraction
//! - [`pipeline`] - Concurrent refresh across all sources
//! - [`storage`] - Tiered response cache and its background sweeper
//! - [`config`] - TOML configuration
//! - [`util`] - Text repair and date normalization
//!
//! # Example
//!
//! ```no_run
//! use newsrack::feed::default_proxies;
//! use newsrack::{
//!     default_sources, refresh_all, FeedCache, FetchOptions, MemoryCacheStore, TieredCache,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = reqwest::Client::new();
//!     let feed_cache = FeedCache::default();
//!     let tiered = TieredCache::new(MemoryCacheStore::new());
//!
//!     let results = refresh_all(
//!         &client,
//!         &feed_cache,
//!         &tiered,
//!         &default_sources(),
//!         &default_proxies(),
//!         &FetchOptions::default(),
//!         None,
//!     )
//!     .await;
//!
//!     for result in &results {
//!         println!("{}: {} articles", result.source.name, result.articles.len());
//!     }
//! }
//! ```

pub mod config;
pub mod feed;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod util;

pub use config::Config;
pub use feed::{fetch_feed, Article, FeedCache, FetchOptions, FetchResult};
pub use pipeline::refresh_all;
pub use source::{default_sources, Source};
pub use storage::{CacheJanitor, MemoryCacheStore, SqliteCacheStore, TieredCache};
