//! SQLite-backed cache store.
//!
//! One `cache_entries` table keyed by `(generation, partition, cache_key)`.
//! Every read filters on the active generation, so a rollover takes effect
//! before the purge of older rows has finished.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use harbor_core::{HeaderList, ResponseSnapshot, StorageGeneration};
use sqlx::{Row, SqlitePool};

use super::r#trait::{CacheEntry, CacheStore, Partition};
use crate::error::{StoreError, map_sqlx_error};

/// SQLite-backed cache store.
///
/// Cheap to clone; clones share the pool and the active generation.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
    active: Arc<RwLock<StorageGeneration>>,
}

impl SqliteCacheStore {
    /// Wrap a pool whose schema has been applied (see [`crate::db`]).
    pub fn new(pool: SqlitePool, generation: StorageGeneration) -> Self {
        Self {
            pool,
            active: Arc::new(RwLock::new(generation)),
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for SqliteCacheStore {
    fn active_generation(&self) -> StorageGeneration {
        match self.active.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn activate(&self, generation: StorageGeneration) -> Result<u64, StoreError> {
        {
            let mut active = self
                .active
                .write()
                .map_err(|_| StoreError::storage("cache generation lock poisoned"))?;
            *active = generation.clone();
        }
        self.evict_generations_except(&generation).await
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let generation = self.active_generation();

        let row = sqlx::query(
            r#"
            SELECT status, headers, body, cached_at
            FROM cache_entries
            WHERE generation = ?1
              AND partition = ?2
              AND cache_key = ?3
            "#,
        )
        .bind(generation.as_str())
        .bind(partition.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("cache get", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: i64 = row.try_get("status").map_err(|e| map_sqlx_error("cache get", e))?;
        let headers: String = row.try_get("headers").map_err(|e| map_sqlx_error("cache get", e))?;
        let body: Vec<u8> = row.try_get("body").map_err(|e| map_sqlx_error("cache get", e))?;
        let cached_at: String =
            row.try_get("cached_at").map_err(|e| map_sqlx_error("cache get", e))?;

        let status = u16::try_from(status)
            .map_err(|_| StoreError::corrupt(format!("invalid cached status {status} for {key}")))?;
        let headers: HeaderList = serde_json::from_str(&headers)
            .map_err(|e| StoreError::corrupt(format!("invalid cached headers for {key}: {e}")))?;
        let cached_at = DateTime::parse_from_rfc3339(&cached_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::corrupt(format!("invalid cached_at for {key}: {e}")))?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            partition,
            generation,
            response: ResponseSnapshot {
                status,
                headers,
                body,
            },
            cached_at,
        }))
    }

    async fn put(
        &self,
        partition: Partition,
        key: &str,
        response: &ResponseSnapshot,
    ) -> Result<(), StoreError> {
        let generation = self.active_generation();
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| StoreError::storage(format!("failed to serialize headers: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (
                generation,
                partition,
                cache_key,
                status,
                headers,
                body,
                cached_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(generation, partition, cache_key)
            DO UPDATE SET
                status = excluded.status,
                headers = excluded.headers,
                body = excluded.body,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(generation.as_str())
        .bind(partition.as_str())
        .bind(key)
        .bind(i64::from(response.status))
        .bind(&headers)
        .bind(&response.body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("cache put", e))?;

        Ok(())
    }

    async fn evict_generations_except(
        &self,
        active: &StorageGeneration,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE generation <> ?1
            "#,
        )
        .bind(active.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("cache evict", e))?;

        Ok(result.rows_affected())
    }

    async fn len(&self, partition: Partition) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM cache_entries
            WHERE generation = ?1
              AND partition = ?2
            "#,
        )
        .bind(self.active_generation().as_str())
        .bind(partition.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("cache len", e))?;

        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn generation(tag: &str) -> StorageGeneration {
        StorageGeneration::new(tag).unwrap()
    }

    async fn store(tag: &str) -> SqliteCacheStore {
        let pool = db::open_in_memory().await.unwrap();
        SqliteCacheStore::new(pool, generation(tag))
    }

    #[tokio::test]
    async fn round_trips_status_headers_and_body() {
        let store = store("v1").await;
        let resp = ResponseSnapshot::new(200)
            .with_header("content-type", "application/javascript")
            .with_body(b"console.log(1)".to_vec());

        store.put(Partition::Static, "GET https://a.test/app.js", &resp).await.unwrap();
        let hit = store
            .get(Partition::Static, "GET https://a.test/app.js")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(hit.response, resp);
        assert_eq!(hit.partition, Partition::Static);
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let store = store("v1").await;
        let key = "GET https://a.test/api/products";
        store
            .put(Partition::Api, key, &ResponseSnapshot::new(200).with_body(b"old".to_vec()))
            .await
            .unwrap();
        store
            .put(Partition::Api, key, &ResponseSnapshot::new(200).with_body(b"new".to_vec()))
            .await
            .unwrap();

        let hit = store.get(Partition::Api, key).await.unwrap().unwrap();
        assert_eq!(hit.response.body, b"new");
        assert_eq!(store.len(Partition::Api).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn activation_purges_other_generations() {
        let store = store("v1").await;
        store
            .put(Partition::Static, "GET https://a.test/a.css", &ResponseSnapshot::new(200))
            .await
            .unwrap();
        store
            .put(Partition::Api, "GET https://a.test/api/p", &ResponseSnapshot::new(200))
            .await
            .unwrap();

        let purged = store.activate(generation("v2")).await.unwrap();

        assert_eq!(purged, 2);
        assert!(store.get(Partition::Static, "GET https://a.test/a.css").await.unwrap().is_none());
        assert_eq!(store.len(Partition::Api).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_rows_are_invisible_before_purge() {
        let pool = db::open_in_memory().await.unwrap();
        let old = SqliteCacheStore::new(pool.clone(), generation("v1"));
        old.put(Partition::Static, "GET https://a.test/app.js", &ResponseSnapshot::new(200))
            .await
            .unwrap();

        // A store scoped to the new generation, without any purge yet.
        let new = SqliteCacheStore::new(pool, generation("v2"));
        assert!(new.get(Partition::Static, "GET https://a.test/app.js").await.unwrap().is_none());
    }
}
