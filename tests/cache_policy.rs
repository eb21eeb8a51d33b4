//! Integration tests for the tiered response cache over the SQLite
//! store: cache-first and network-first strategies, stale eviction, and
//! the background sweeper.
//!
//! Each test opens its own in-memory database for isolation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsrack::feed::FetchOptions;
use newsrack::storage::{
    CacheJanitor, CacheStore, CachedResponse, SqliteCacheStore, SweepStats, TieredCache,
};

async fn sqlite_cache() -> TieredCache<SqliteCacheStore> {
    TieredCache::new(SqliteCacheStore::open(":memory:").await.unwrap())
}

fn record_aged(url: &str, body: &str, age: chrono::Duration) -> CachedResponse {
    CachedResponse {
        url: url.to_string(),
        status: 200,
        content_type: Some("text/plain".to_string()),
        body: body.as_bytes().to_vec(),
        cached_at: Utc::now() - age,
    }
}

// ============================================================================
// Strategy Round Trips
// ============================================================================

#[tokio::test]
async fn test_static_asset_served_from_cache_on_second_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("asset body"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = sqlite_cache().await;
    let url = format!("{}/app.js", server.uri());
    let client = reqwest::Client::new();
    let opts = FetchOptions::default();

    let first = cache.fetch_static(&client, &url, &opts).await.unwrap();
    assert!(!first.served_from_cache);

    let second = cache.fetch_static(&client, &url, &opts).await.unwrap();
    assert!(second.served_from_cache);
    assert_eq!(second.body, b"asset body");
}

#[tokio::test]
async fn test_feed_body_always_refetched_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
        .expect(2)
        .mount(&server)
        .await;

    let cache = sqlite_cache().await;
    let url = format!("{}/feed", server.uri());
    let client = reqwest::Client::new();
    let opts = FetchOptions::default();

    let first = cache.fetch_feed(&client, &url, &opts).await.unwrap();
    let second = cache.fetch_feed(&client, &url, &opts).await.unwrap();
    assert!(!first.served_from_cache);
    assert!(!second.served_from_cache);

    let stored = cache.store().find("feeds", &url).await.unwrap().unwrap();
    assert_eq!(stored.body, b"<rss/>");
    assert_eq!(stored.status, 200);
}

#[tokio::test]
async fn test_image_refetched_after_stale_entry_swept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new image"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = sqlite_cache().await;
    let url = format!("{}/cover.jpg", server.uri());
    cache
        .store()
        .put("images", record_aged(&url, "old image", chrono::Duration::days(8)))
        .await
        .unwrap();

    let stats = cache.sweep().await;
    assert_eq!(stats, SweepStats { examined: 1, removed: 1 });

    let client = reqwest::Client::new();
    let got = cache
        .fetch_image(&client, &url, &FetchOptions::default())
        .await
        .unwrap();
    assert!(!got.served_from_cache);
    assert_eq!(got.body, b"new image");
}

// ============================================================================
// Sweeping
// ============================================================================

#[tokio::test]
async fn test_sweep_spans_all_namespaces() {
    let cache = sqlite_cache().await;
    cache
        .store()
        .put(
            "static",
            record_aged("https://example.com/app.js", "stale", chrono::Duration::days(31)),
        )
        .await
        .unwrap();
    cache
        .store()
        .put(
            "images",
            record_aged("https://example.com/fresh.jpg", "fresh", chrono::Duration::days(1)),
        )
        .await
        .unwrap();
    cache
        .store()
        .put(
            "feeds",
            record_aged("https://example.com/feed", "stale", chrono::Duration::hours(1)),
        )
        .await
        .unwrap();

    let stats = cache.sweep().await;
    assert_eq!(stats, SweepStats { examined: 3, removed: 2 });

    assert!(cache
        .store()
        .find("images", "https://example.com/fresh.jpg")
        .await
        .unwrap()
        .is_some());
    assert!(cache
        .store()
        .find("static", "https://example.com/app.js")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_janitor_evicts_stale_entries_in_background() {
    // File-backed database: the sweeper task and this test's polling can
    // acquire different pool connections, and each `:memory:` connection is
    // its own empty database.
    let dir = std::env::temp_dir().join("newsrack_janitor_test");
    std::fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("cache.db");
    std::fs::remove_file(&db_path).ok();

    let store = SqliteCacheStore::open(db_path.to_str().unwrap()).await.unwrap();
    let cache = Arc::new(TieredCache::new(store));
    cache
        .store()
        .put(
            "feeds",
            record_aged("https://example.com/feed", "stale", chrono::Duration::hours(2)),
        )
        .await
        .unwrap();

    let janitor = CacheJanitor::spawn(
        cache.clone(),
        Duration::from_millis(50),
        Duration::from_secs(3600),
    );

    // Poll until the first sweep lands rather than sleeping a fixed time.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let present = cache
            .store()
            .find("feeds", "https://example.com/feed")
            .await
            .unwrap()
            .is_some();
        if !present {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "janitor never swept the stale entry"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    janitor.shutdown().await;
    std::fs::remove_dir_all(&dir).ok();
}
