//! Infrastructure layer: durable stores and the network transport.
//!
//! - `cache_store`: generation-scoped response cache (static + API partitions)
//! - `mutation_queue`: durable FIFO of mutations awaiting delivery
//! - `upstream`: the network seam (`reqwest` in production, fakes in tests)
//! - `db`: SQLite pool + schema shared by both stores

pub mod cache_store;
pub mod db;
pub mod error;
pub mod mutation_queue;
pub mod upstream;

pub use cache_store::{CacheEntry, CacheStore, InMemoryCacheStore, Partition, SqliteCacheStore};
pub use error::StoreError;
pub use mutation_queue::{
    InMemoryMutationQueue, MutationQueue, QueueItem, QueueStats, QueueStatus, SqliteMutationQueue,
};
pub use upstream::{ReqwestUpstream, Upstream, UpstreamError};
