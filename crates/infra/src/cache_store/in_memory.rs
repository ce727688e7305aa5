use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use harbor_core::{ResponseSnapshot, StorageGeneration};

use super::r#trait::{CacheEntry, CacheStore, Partition};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    generation: StorageGeneration,
    partition: Partition,
    key: String,
}

/// In-memory cache store.
///
/// Intended for tests/dev. Not durable.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    active: RwLock<StorageGeneration>,
    entries: Mutex<HashMap<EntryKey, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new(generation: StorageGeneration) -> Self {
        Self {
            active: RwLock::new(generation),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::storage("cache lock poisoned")
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    fn active_generation(&self) -> StorageGeneration {
        match self.active.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn activate(&self, generation: StorageGeneration) -> Result<u64, StoreError> {
        {
            let mut active = self.active.write().map_err(|_| Self::poisoned())?;
            *active = generation.clone();
        }
        self.evict_generations_except(&generation).await
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let lookup = EntryKey {
            generation: self.active_generation(),
            partition,
            key: key.to_string(),
        };
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(&lookup).cloned())
    }

    async fn put(
        &self,
        partition: Partition,
        key: &str,
        response: &ResponseSnapshot,
    ) -> Result<(), StoreError> {
        let generation = self.active_generation();
        let entry = CacheEntry {
            key: key.to_string(),
            partition,
            generation: generation.clone(),
            response: response.clone(),
            cached_at: Utc::now(),
        };
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(
            EntryKey {
                generation,
                partition,
                key: key.to_string(),
            },
            entry,
        );
        Ok(())
    }

    async fn evict_generations_except(
        &self,
        active: &StorageGeneration,
    ) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        let before = entries.len();
        entries.retain(|k, _| &k.generation == active);
        Ok((before - entries.len()) as u64)
    }

    async fn len(&self, partition: Partition) -> Result<usize, StoreError> {
        let generation = self.active_generation();
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries
            .keys()
            .filter(|k| k.partition == partition && k.generation == generation)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(tag: &str) -> StorageGeneration {
        StorageGeneration::new(tag).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_returns_exact_bytes() {
        let store = InMemoryCacheStore::new(generation("v1"));
        let body = vec![0u8, 159, 146, 150, 255];
        let resp = ResponseSnapshot::new(200).with_body(body.clone());

        store.put(Partition::Static, "GET https://a.test/app.js", &resp).await.unwrap();

        let hit = store
            .get(Partition::Static, "GET https://a.test/app.js")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.response.body, body);
        assert_eq!(hit.generation, generation("v1"));
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let store = InMemoryCacheStore::new(generation("v1"));
        store
            .put(Partition::Api, "GET https://a.test/api/x", &ResponseSnapshot::new(200))
            .await
            .unwrap();

        assert!(store.get(Partition::Static, "GET https://a.test/api/x").await.unwrap().is_none());
        assert_eq!(store.len(Partition::Api).await.unwrap(), 1);
        assert_eq!(store.len(Partition::Static).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rollover_makes_prior_generation_unreachable() {
        let store = InMemoryCacheStore::new(generation("v1"));
        store
            .put(Partition::Static, "GET https://a.test/app.js", &ResponseSnapshot::new(200))
            .await
            .unwrap();

        let purged = store.activate(generation("v2")).await.unwrap();

        assert_eq!(purged, 1);
        assert!(store.get(Partition::Static, "GET https://a.test/app.js").await.unwrap().is_none());
        assert_eq!(store.active_generation(), generation("v2"));
    }
}
