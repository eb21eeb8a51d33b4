mod janitor;
mod policy;
mod sqlite;
mod store;

pub use janitor::{CacheJanitor, DEFAULT_SWEEP_INITIAL_DELAY, DEFAULT_SWEEP_INTERVAL};
pub use policy::{CacheClass, Retrieved, SweepStats, TieredCache, TransportError};
pub use sqlite::SqliteCacheStore;
pub use store::{CacheStore, CachedResponse, MemoryCacheStore, StoreError};
