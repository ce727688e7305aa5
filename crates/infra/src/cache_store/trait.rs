use chrono::{DateTime, Utc};
use harbor_core::{ResponseSnapshot, StorageGeneration};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Static assets and the application shell (cache-first).
    Static,
    /// Allow-listed API reads (network-first fallback).
    Api,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Static => "static",
            Partition::Api => "api",
        }
    }
}

/// Snapshot of the last successful response for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Method-qualified URL.
    pub key: String,
    pub partition: Partition,
    pub generation: StorageGeneration,
    pub response: ResponseSnapshot,
    pub cached_at: DateTime<Utc>,
}

/// Versioned key → response store.
///
/// Reads only ever see the active generation. `put` is a side channel: the
/// cache is never the system of record, so callers log and ignore write
/// failures.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Generation that reads and writes are currently scoped to.
    fn active_generation(&self) -> StorageGeneration;

    /// Switch to `generation`, then purge every other generation.
    ///
    /// Prior entries become unreachable as soon as the switch happens, even
    /// if the purge itself fails. Returns the number of purged entries.
    async fn activate(&self, generation: StorageGeneration) -> Result<u64, StoreError>;

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or overwrite the entry for `key` in the active generation.
    async fn put(
        &self,
        partition: Partition,
        key: &str,
        response: &ResponseSnapshot,
    ) -> Result<(), StoreError>;

    /// Delete every entry not belonging to `active`.
    async fn evict_generations_except(&self, active: &StorageGeneration)
        -> Result<u64, StoreError>;

    /// Number of entries in `partition` for the active generation.
    async fn len(&self, partition: Partition) -> Result<usize, StoreError>;
}
