use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

use super::policy::TieredCache;
use super::store::CacheStore;

/// Delay before the first sweep, so startup traffic settles first.
pub const DEFAULT_SWEEP_INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
/// Cadence of recurring sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background task that periodically evicts stale cache entries.
///
/// The first sweep runs after `initial_delay`, then every `interval`.
/// Dropping the janitor also stops the task because the shutdown channel
/// closes.
pub struct CacheJanitor {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl CacheJanitor {
    pub fn spawn<S: CacheStore>(
        cache: Arc<TieredCache<S>>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = &mut shutdown_rx => return,
                _ = sleep(initial_delay) => {}
            }

            // First tick fires immediately, right after the initial delay.
            let mut ticks = interval_at(Instant::now(), interval);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    _ = ticks.tick() => {
                        let stats = cache.sweep().await;
                        tracing::debug!(
                            examined = stats.examined,
                            removed = stats.removed,
                            "Scheduled cache sweep finished"
                        );
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
