use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::feed::parser::Article;

/// How long a parsed article list is served without refetching.
pub const DEFAULT_FEED_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    articles: Vec<Article>,
    stored_at: Instant,
}

/// In-process memo of parsed article lists, keyed by feed URL.
///
/// This sits in front of the whole proxy cascade: a fresh entry means no
/// network traffic at all for that source. Only successful fetches are
/// stored, so failures are always retried on the next refresh. Stale
/// entries are evicted lazily on lookup.
pub struct FeedCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached articles for a feed when still fresh.
    pub async fn get(&self, feed_url: &str) -> Option<Vec<Article>> {
        let mut entries = self.entries.lock().await;
        match entries.get(feed_url) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.articles.clone()),
            Some(_) => {
                entries.remove(feed_url);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, feed_url: &str, articles: Vec<Article>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            feed_url.to_string(),
            CacheEntry {
                articles,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every entry. Used by forced refreshes to guarantee network
    /// fetches for all sources.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_TTL)
    }
}
