//! Request router.
//!
//! Every intercepted request is classified by the [`RouteTable`] and handled
//! by exactly one strategy:
//!
//! | class              | strategy                                        |
//! |--------------------|-------------------------------------------------|
//! | static asset       | cache-first, app shell for offline navigations  |
//! | API read           | network-first, cache fallback, `OFFLINE` 503    |
//! | syncable mutation  | deliver now, queue on transport failure         |
//! | anything else      | pass through                                    |
//!
//! Storage failures never fail a request: a cache read error is a miss, a
//! cache write error is logged, and a failed enqueue answers `OFFLINE`.

use std::sync::Arc;

use harbor_core::http::IDEMPOTENCY_KEY;
use harbor_core::routes::PassThroughReason;
use harbor_core::{ItemId, RequestSnapshot, ResourceClass, ResponseSnapshot, RouteTable};
use harbor_infra::{CacheStore, MutationQueue, Partition, QueueItem, Upstream, UpstreamError};
use serde::Serialize;
use url::Url;

use crate::connectivity::ConnectivityMonitor;
use crate::responses;

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Network,
    /// Cache-first hit; no network attempt was made.
    Cache,
    /// Network failed; served the last cached value for the key.
    CacheFallback,
    /// Offline navigation served the cached application shell.
    AppShell,
    /// Mutation persisted for later delivery.
    Queued,
    /// Synthesized `OFFLINE` / `unavailable` / gateway error.
    Synthesized,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::CacheFallback => "cache-fallback",
            ResponseSource::AppShell => "app-shell",
            ResponseSource::Queued => "queued",
            ResponseSource::Synthesized => "synthesized",
        }
    }
}

/// A routed response plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
    /// Set when the mutation path assigned an item id.
    pub item_id: Option<ItemId>,
}

impl Routed {
    fn new(response: ResponseSnapshot, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            item_id: None,
        }
    }
}

pub struct RequestRouter {
    routes: RouteTable,
    origin: Url,
    cache: Arc<dyn CacheStore>,
    queue: Arc<dyn MutationQueue>,
    upstream: Arc<dyn Upstream>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl RequestRouter {
    pub fn new(
        routes: RouteTable,
        origin: Url,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn MutationQueue>,
        upstream: Arc<dyn Upstream>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            routes,
            origin,
            cache,
            queue,
            upstream,
            connectivity,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Route one intercepted request.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path()))]
    pub async fn handle(&self, request: RequestSnapshot) -> Routed {
        let class = self.routes.classify(&request, &self.origin);
        tracing::debug!(?class, "classified request");

        match class {
            ResourceClass::StaticAsset { navigation } => self.cache_first(request, navigation).await,
            ResourceClass::ApiRead { cacheable } => self.network_first(request, cacheable).await,
            ResourceClass::SyncableMutation => self.deliver_or_queue(request).await,
            ResourceClass::PassThrough(reason) => self.pass_through(request, reason).await,
        }
    }

    async fn cache_first(&self, request: RequestSnapshot, navigation: bool) -> Routed {
        let key = request.cache_key();
        // A ranged read wants a slice of the stored body; let the origin answer it.
        if !is_ranged(&request) {
            if let Some(hit) = self.cache_get(Partition::Static, &key).await {
                return Routed::new(hit, ResponseSource::Cache);
            }
        }

        match self.send(&request).await {
            Ok(response) => {
                if is_storable(&request, &response) {
                    self.cache_put(Partition::Static, &key, &response).await;
                }
                Routed::new(response, ResponseSource::Network)
            }
            Err(err) => {
                tracing::debug!(error = %err, "static asset unreachable");
                if navigation {
                    if let Some(shell) = self.app_shell().await {
                        return Routed::new(shell, ResponseSource::AppShell);
                    }
                }
                Routed::new(responses::unavailable(), ResponseSource::Synthesized)
            }
        }
    }

    async fn network_first(&self, request: RequestSnapshot, cacheable: bool) -> Routed {
        let key = request.cache_key();
        match self.send(&request).await {
            Ok(response) => {
                if cacheable && is_storable(&request, &response) {
                    self.cache_put(Partition::Api, &key, &response).await;
                }
                Routed::new(response, ResponseSource::Network)
            }
            Err(err) => {
                tracing::debug!(error = %err, "API read unreachable; trying cache");
                match self.cache_get(Partition::Api, &key).await {
                    Some(hit) => Routed::new(hit, ResponseSource::CacheFallback),
                    None => Routed::new(responses::offline(), ResponseSource::Synthesized),
                }
            }
        }
    }

    /// Mutation path: the item id is assigned before the first attempt and
    /// travels as the idempotency key on every delivery attempt.
    async fn deliver_or_queue(&self, mut request: RequestSnapshot) -> Routed {
        let item_id = ItemId::new();
        if !request.headers.contains(IDEMPOTENCY_KEY) {
            request.headers.set(IDEMPOTENCY_KEY, item_id.to_string());
        }

        let routed = match self.send(&request).await {
            Ok(response) => Routed::new(response, ResponseSource::Network),
            Err(UpstreamError::Transport(reason)) => {
                let item = QueueItem::from_request(item_id, &request);
                match self.queue.enqueue(item).await {
                    Ok(item) => {
                        tracing::info!(
                            item_id = %item.id,
                            seq = item.seq,
                            %reason,
                            "mutation queued for later delivery"
                        );
                        Routed::new(responses::queued(item.id), ResponseSource::Queued)
                    }
                    Err(err) => {
                        tracing::warn!(item_id = %item_id, error = %err, "failed to queue mutation");
                        return Routed::new(responses::offline(), ResponseSource::Synthesized);
                    }
                }
            }
            // Neither delivered nor queued: no item exists under this id.
            Err(err) => {
                return Routed::new(
                    responses::bad_gateway(&err.to_string()),
                    ResponseSource::Synthesized,
                );
            }
        };

        Routed {
            item_id: Some(item_id),
            ..routed
        }
    }

    async fn pass_through(&self, request: RequestSnapshot, reason: PassThroughReason) -> Routed {
        tracing::debug!(?reason, "passing through");
        match self.send(&request).await {
            Ok(response) => Routed::new(response, ResponseSource::Network),
            Err(err) => Routed::new(
                responses::bad_gateway(&err.to_string()),
                ResponseSource::Synthesized,
            ),
        }
    }

    /// Send upstream and record what the exchange says about connectivity.
    async fn send(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, UpstreamError> {
        let result = self.upstream.send(request).await;
        match &result {
            Ok(_) => {
                self.connectivity.set_online();
            }
            Err(err) if err.is_transport() => {
                self.connectivity.set_offline();
            }
            Err(_) => {}
        }
        result
    }

    async fn app_shell(&self) -> Option<ResponseSnapshot> {
        let url = self.origin.join(&self.routes.app_shell).ok()?;
        let key = RequestSnapshot::new("GET", url).cache_key();
        self.cache_get(Partition::Static, &key).await
    }

    async fn cache_get(&self, partition: Partition, key: &str) -> Option<ResponseSnapshot> {
        match self.cache.get(partition, key).await {
            Ok(entry) => entry.map(|e| e.response),
            Err(err) => {
                tracing::warn!(%key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn cache_put(&self, partition: Partition, key: &str, response: &ResponseSnapshot) {
        if let Err(err) = self.cache.put(partition, key, response).await {
            tracing::warn!(%key, error = %err, "cache write failed");
        }
    }
}

fn is_ranged(request: &RequestSnapshot) -> bool {
    request.headers.contains("range")
}

/// Only complete representations are written back: a `206` slice or a
/// ranged request would poison the key for every later full read.
fn is_storable(request: &RequestSnapshot, response: &ResponseSnapshot) -> bool {
    response.status == 200 && !is_ranged(request)
}
