//! Process-start activation.
//!
//! 1. Return items orphaned `in_flight` by a previous process to `pending`.
//! 2. Fetch the precache manifest. Failures are reported, never fatal.
//! 3. Switch the cache to the configured generation and purge all others.
//! 4. Store the fetched manifest entries in the new generation.
//!
//! Fetching before the switch means a failed fetch is known before any
//! older entries are purged.

use harbor_core::{RequestSnapshot, ResponseSnapshot, StorageGeneration};
use harbor_infra::{CacheStore, MutationQueue, Partition, StoreError, Upstream};
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecacheFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    pub generation: StorageGeneration,
    pub precached: Vec<String>,
    pub precache_failures: Vec<PrecacheFailure>,
    /// Cache entries purged from superseded generations.
    pub evicted: u64,
    /// Queue items returned from `in_flight` to `pending`.
    pub recovered: u64,
}

/// Run activation. Only queue or cache storage failures are errors.
pub async fn activate(
    cache: &dyn CacheStore,
    queue: &dyn MutationQueue,
    upstream: &dyn Upstream,
    origin: &Url,
    generation: StorageGeneration,
    manifest: &[String],
) -> Result<ActivationReport, StoreError> {
    let recovered = queue.recover_in_flight().await?;
    if recovered > 0 {
        tracing::warn!(recovered, "recovered mutations left in flight by a previous run");
    }

    let mut precache_failures = Vec::new();
    let mut fetched: Vec<(String, String, ResponseSnapshot)> = Vec::new();
    for path in manifest {
        match fetch(upstream, origin, path).await {
            Ok((key, response)) => fetched.push((path.clone(), key, response)),
            Err(error) => {
                tracing::warn!(%path, %error, "precache fetch failed");
                precache_failures.push(PrecacheFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    let evicted = cache.activate(generation.clone()).await?;

    let mut precached = Vec::new();
    for (path, key, response) in fetched {
        match cache.put(Partition::Static, &key, &response).await {
            Ok(()) => precached.push(path),
            Err(err) => precache_failures.push(PrecacheFailure {
                path,
                error: err.to_string(),
            }),
        }
    }

    tracing::info!(
        generation = %generation,
        precached = precached.len(),
        failed = precache_failures.len(),
        evicted,
        recovered,
        "activation complete"
    );

    Ok(ActivationReport {
        generation,
        precached,
        precache_failures,
        evicted,
        recovered,
    })
}

async fn fetch(
    upstream: &dyn Upstream,
    origin: &Url,
    path: &str,
) -> Result<(String, ResponseSnapshot), String> {
    let url = origin.join(path).map_err(|e| e.to_string())?;
    let request = RequestSnapshot::new("GET", url);
    let response = upstream.send(&request).await.map_err(|e| e.to_string())?;
    if !response.is_success() {
        return Err(format!("HTTP {}", response.status));
    }
    Ok((request.cache_key(), response))
}
