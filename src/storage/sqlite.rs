use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use super::store::{CacheStore, CachedResponse, StoreError};

/// Cache store backed by a single SQLite database file.
///
/// All three namespaces share one table keyed by (namespace, url), so a
/// deployment carries exactly one cache file regardless of how many
/// response classes it stores.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Open the cache database, creating the file and schema if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process has the database
    /// locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the DB file with mode 0o600 so there is no
        // window where it exists with default umask permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "SEC-010: Failed to set cache file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite reports the error at connect_with.
                }
            }
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to
        // release before returning SQLITE_BUSY. Using pragma() ensures all
        // connections in the pool inherit the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers peak concurrent
        // readers (parallel feed fetches + the sweeper).
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cached_responses (
                namespace TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT,
                body BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, url)
            )
        "#,
        )
        .execute(&pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn find(
        &self,
        namespace: &str,
        url: &str,
    ) -> Result<Option<CachedResponse>, StoreError> {
        let row: Option<(i64, Option<String>, Vec<u8>, i64)> = sqlx::query_as(
            r#"
            SELECT status, content_type, body, cached_at
            FROM cached_responses
            WHERE namespace = ? AND url = ?
        "#,
        )
        .bind(namespace)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(|(status, content_type, body, cached_at)| CachedResponse {
            url: url.to_string(),
            status: status as u16,
            content_type,
            body,
            cached_at: DateTime::from_timestamp(cached_at, 0).unwrap_or_else(Utc::now),
        }))
    }

    async fn put(&self, namespace: &str, response: CachedResponse) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cached_responses
                (namespace, url, status, content_type, body, cached_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(namespace)
        .bind(&response.url)
        .bind(response.status as i64)
        .bind(&response.content_type)
        .bind(&response.body)
        .bind(response.cached_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, url: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cached_responses WHERE namespace = ? AND url = ?")
            .bind(namespace)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT url FROM cached_responses WHERE namespace = ? ORDER BY url")
                .bind(namespace)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(|(url,)| url).collect())
    }
}
