//! Scriptable collaborators for router, coordinator and activation tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use harbor_core::{ItemId, RequestSnapshot, ResponseSnapshot, StorageGeneration};
use harbor_infra::{
    CacheEntry, CacheStore, MutationQueue, Partition, QueueItem, QueueStats, StoreError, Upstream,
    UpstreamError,
};

pub const ORIGIN: &str = "https://shop.test";

pub fn get(path: &str) -> RequestSnapshot {
    RequestSnapshot::parse("GET", &format!("{ORIGIN}{path}")).unwrap()
}

pub fn post(path: &str, body: &str) -> RequestSnapshot {
    RequestSnapshot::parse("POST", &format!("{ORIGIN}{path}"))
        .unwrap()
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

/// Upstream that answers from a path → response table and can be switched
/// offline. Unknown paths answer `404`.
#[derive(Debug, Default)]
pub struct FakeUpstream {
    online: AtomicBool,
    calls: AtomicUsize,
    routes: Mutex<HashMap<String, ResponseSnapshot>>,
    invalid: Mutex<HashMap<String, String>>,
    seen: Mutex<Vec<RequestSnapshot>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn respond(&self, path: &str, response: ResponseSnapshot) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    /// Make requests to `path` unbuildable, as a malformed method would be.
    pub fn reject(&self, path: &str, reason: &str) {
        self.invalid.lock().unwrap().insert(path.to_string(), reason.to_string());
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Requests attempted, including those that failed at the transport level.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests that reached the "server".
    pub fn received(&self) -> Vec<RequestSnapshot> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Upstream for FakeUpstream {
    async fn send(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(UpstreamError::transport("connection refused"));
        }
        if let Some(reason) = self.invalid.lock().unwrap().get(request.path()) {
            return Err(UpstreamError::InvalidRequest(reason.clone()));
        }
        self.seen.lock().unwrap().push(request.clone());
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.path())
            .cloned()
            .unwrap_or_else(|| ResponseSnapshot::new(404)))
    }
}

fn unavailable() -> StoreError {
    StoreError::storage("disk unavailable")
}

/// Cache store whose backing storage is gone.
#[derive(Debug, Default)]
pub struct BrokenCache;

#[async_trait::async_trait]
impl CacheStore for BrokenCache {
    fn active_generation(&self) -> StorageGeneration {
        StorageGeneration::new("broken").unwrap()
    }

    async fn activate(&self, _generation: StorageGeneration) -> Result<u64, StoreError> {
        Err(unavailable())
    }

    async fn get(&self, _partition: Partition, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Err(unavailable())
    }

    async fn put(
        &self,
        _partition: Partition,
        _key: &str,
        _response: &ResponseSnapshot,
    ) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn evict_generations_except(&self, _active: &StorageGeneration) -> Result<u64, StoreError> {
        Err(unavailable())
    }

    async fn len(&self, _partition: Partition) -> Result<usize, StoreError> {
        Err(unavailable())
    }
}

/// Mutation queue whose backing storage is gone.
#[derive(Debug, Default)]
pub struct BrokenQueue;

#[async_trait::async_trait]
impl MutationQueue for BrokenQueue {
    async fn enqueue(&self, _item: QueueItem) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn get(&self, _id: ItemId) -> Result<Option<QueueItem>, StoreError> {
        Err(unavailable())
    }

    async fn list_pending(&self) -> Result<Vec<QueueItem>, StoreError> {
        Err(unavailable())
    }

    async fn list_failed(&self) -> Result<Vec<QueueItem>, StoreError> {
        Err(unavailable())
    }

    async fn claim(&self, _id: ItemId) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn complete(&self, _id: ItemId) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn release(&self, _id: ItemId, _error: &str) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn fail_terminal(&self, _id: ItemId, _error: &str) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn acknowledge_failure(&self, _id: ItemId) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn requeue(&self, _id: ItemId) -> Result<QueueItem, StoreError> {
        Err(unavailable())
    }

    async fn recover_in_flight(&self) -> Result<u64, StoreError> {
        Err(unavailable())
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        Err(unavailable())
    }
}
