use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from a cache store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the cache database lock.
    #[error("cache database is locked by another instance")]
    Locked,

    /// Any other backend failure.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classifies sqlx errors, surfacing lock contention as its own
    /// variant so callers can report it as "already running" instead of a
    /// generic I/O failure.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::Locked;
        }

        StoreError::Database(err)
    }
}

/// One cached HTTP response body with enough metadata to serve it again.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Wall-clock time of the original transfer; freshness decisions
    /// compare against this.
    pub cached_at: DateTime<Utc>,
}

/// Keyed storage for cached responses, grouped into namespaces.
///
/// A namespace corresponds to one cache class ("static", "images",
/// "feeds") and each URL appears at most once per namespace. The store
/// holds bytes and timestamps only; time-to-live policy lives in the
/// tiered cache on top.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn find(&self, namespace: &str, url: &str)
        -> Result<Option<CachedResponse>, StoreError>;

    /// Inserts or replaces the entry for `response.url`.
    async fn put(&self, namespace: &str, response: CachedResponse) -> Result<(), StoreError>;

    async fn delete(&self, namespace: &str, url: &str) -> Result<(), StoreError>;

    /// Every URL currently stored under the namespace.
    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError>;
}

/// Volatile store used by tests and by deployments that do not want a
/// database on disk.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<(String, String), CachedResponse>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn find(
        &self,
        namespace: &str,
        url: &str,
    ) -> Result<Option<CachedResponse>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&(namespace.to_string(), url.to_string()))
            .cloned())
    }

    async fn put(&self, namespace: &str, response: CachedResponse) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert((namespace.to_string(), response.url.clone()), response);
        Ok(())
    }

    async fn delete(&self, namespace: &str, url: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.remove(&(namespace.to_string(), url.to_string()));
        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, url)| url.clone())
            .collect())
    }
}
