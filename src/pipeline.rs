//! Concurrent refresh across every configured source.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::feed::{fetch_feed, FeedCache, FetchFailure, FetchOptions, FetchResult, ProxyEndpoint};
use crate::source::Source;
use crate::storage::{CacheStore, TieredCache};

/// Refreshes every source concurrently and returns results in source
/// order.
///
/// # Concurrency
///
/// - All sources are fetched simultaneously
/// - Each source is bounded end to end by `opts.source_timeout`; a source
///   that exceeds it reports [`FetchFailure::TimedOut`] instead of
///   stalling the refresh
/// - Completed results are also delivered over `results_tx` as they
///   land, so a consumer can render each source without waiting for the
///   slowest one
///
/// A source failure never aborts the refresh; its result carries the
/// error and an empty article list.
pub async fn refresh_all<S: CacheStore>(
    client: &reqwest::Client,
    feed_cache: &FeedCache,
    tiered: &TieredCache<S>,
    sources: &[Source],
    proxies: &[ProxyEndpoint],
    opts: &FetchOptions,
    results_tx: Option<mpsc::Sender<FetchResult>>,
) -> Vec<FetchResult> {
    if sources.is_empty() {
        return Vec::new();
    }

    let mut indexed: Vec<(usize, FetchResult)> = stream::iter(sources.iter().enumerate())
        .map(|(index, source)| {
            let results_tx = results_tx.clone();

            async move {
                let fetched = tokio::time::timeout(
                    opts.source_timeout,
                    fetch_feed(client, feed_cache, tiered, proxies, source, opts),
                )
                .await;

                let result = match fetched {
                    Ok(result) => result,
                    Err(_) => {
                        let secs = opts.source_timeout.as_secs();
                        tracing::warn!(source = %source.name, secs = secs, "Source refresh timed out");
                        FetchResult::failure(
                            source.clone(),
                            FetchFailure::TimedOut {
                                source: source.name.clone(),
                                secs,
                            },
                        )
                    }
                };

                if let Some(tx) = &results_tx {
                    if let Err(e) = tx.send(result.clone()).await {
                        tracing::warn!(error = %e, source = %result.source.name, "Results channel send failed (receiver dropped)");
                    }
                }

                (index, result)
            }
        })
        .buffer_unordered(sources.len())
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}
