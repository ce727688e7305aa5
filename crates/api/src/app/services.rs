//! Service wiring: stores, transport, router, coordinator and bus.

use std::sync::Arc;

use anyhow::Context;
use harbor_agent::{
    ActivationReport, ConnectivityMonitor, HarborConfig, RequestRouter, SyncCoordinator,
    SyncWorker,
};
use harbor_core::StorageGeneration;
use harbor_events::{InMemoryNotificationBus, NotificationEvent};
use harbor_infra::{
    CacheStore, InMemoryCacheStore, InMemoryMutationQueue, MutationQueue, ReqwestUpstream,
    SqliteCacheStore, SqliteMutationQueue, Upstream, db,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Everything the HTTP handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub router: RequestRouter,
    pub coordinator: Arc<SyncCoordinator>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub bus: Arc<InMemoryNotificationBus<NotificationEvent>>,
    pub generation: StorageGeneration,
    cache: Arc<dyn CacheStore>,
    queue: Arc<dyn MutationQueue>,
    upstream: Arc<dyn Upstream>,
    config: HarborConfig,
}

impl AppServices {
    /// Durable wiring: both stores share one SQLite file.
    pub async fn sqlite(config: HarborConfig) -> anyhow::Result<Self> {
        let dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => db::default_data_dir()?,
        };
        let pool = db::open(&dir)
            .await
            .with_context(|| format!("failed to open harbor storage in {:?}", dir))?;
        tracing::info!(data_dir = %dir.display(), "storage opened");

        let cache = Arc::new(SqliteCacheStore::new(pool.clone(), config.generation.clone()));
        let queue = Arc::new(SqliteMutationQueue::new(pool));
        let upstream = Arc::new(ReqwestUpstream::new().context("failed to build HTTP client")?);
        Ok(Self::wire(config, cache, queue, upstream))
    }

    /// Non-durable wiring (tests/dev).
    pub fn in_memory(config: HarborConfig) -> anyhow::Result<Self> {
        let cache = Arc::new(InMemoryCacheStore::new(config.generation.clone()));
        let queue = Arc::new(InMemoryMutationQueue::new());
        let upstream = Arc::new(ReqwestUpstream::new().context("failed to build HTTP client")?);
        Ok(Self::wire(config, cache, queue, upstream))
    }

    pub fn wire(
        config: HarborConfig,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn MutationQueue>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let connectivity = Arc::new(ConnectivityMonitor::new());
        let bus = Arc::new(InMemoryNotificationBus::new());

        let router = RequestRouter::new(
            config.routes.clone(),
            config.upstream_url.clone(),
            cache.clone(),
            queue.clone(),
            upstream.clone(),
            connectivity.clone(),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            upstream.clone(),
            bus.clone(),
            connectivity.clone(),
            config.max_attempts,
        ));

        Self {
            router,
            coordinator,
            connectivity,
            bus,
            generation: config.generation.clone(),
            cache,
            queue,
            upstream,
            config,
        }
    }

    pub fn config(&self) -> &HarborConfig {
        &self.config
    }

    pub async fn queue_stats(&self) -> Option<harbor_infra::QueueStats> {
        match self.queue.stats().await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::warn!(error = %err, "queue stats unavailable");
                None
            }
        }
    }

    /// Recover, precache and roll the cache generation over.
    pub async fn activate(&self) -> anyhow::Result<ActivationReport> {
        harbor_agent::activate(
            self.cache.as_ref(),
            self.queue.as_ref(),
            self.upstream.as_ref(),
            &self.config.upstream_url,
            self.generation.clone(),
            &self.config.manifest,
        )
        .await
        .context("activation failed")
    }

    /// Spawn the background sync worker.
    pub fn start_worker(&self) -> anyhow::Result<(JoinHandle<()>, Arc<Notify>)> {
        let health_url = self.config.upstream_join(&self.config.health_path)?;
        let worker = SyncWorker::new(
            self.coordinator.clone(),
            self.connectivity.clone(),
            self.config.sync_interval,
        )
        .with_health_probe(self.upstream.clone(), health_url);
        let shutdown = worker.shutdown_handle();
        Ok((worker.start(), shutdown))
    }
}
