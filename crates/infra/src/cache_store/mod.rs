//! Generation-scoped response cache.
//!
//! Two partitions (static assets, API responses) share one active
//! [`StorageGeneration`](harbor_core::StorageGeneration). Entries are never
//! expired individually: a rollover to a new generation is the only
//! eviction, which keeps lookups O(1) with no per-entry bookkeeping.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use r#trait::{CacheEntry, CacheStore, Partition};
