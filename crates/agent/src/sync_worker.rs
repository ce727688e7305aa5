//! Background worker that owns the replay triggers.

use std::sync::Arc;
use std::time::Duration;

use harbor_core::RequestSnapshot;
use harbor_infra::Upstream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use url::Url;

use crate::connectivity::ConnectivityMonitor;
use crate::sync_coordinator::SyncCoordinator;

/// Drains the mutation queue when connectivity is regained and on every
/// interval tick while online. While offline, ticks probe the upstream
/// health endpoint instead.
pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<ConnectivityMonitor>,
    interval: Duration,
    probe: Option<(Arc<dyn Upstream>, Url)>,
    shutdown: Arc<Notify>,
}

impl SyncWorker {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        connectivity: Arc<ConnectivityMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            connectivity,
            interval,
            probe: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Probe `health_url` on offline ticks; any HTTP response counts as
    /// reachable.
    pub fn with_health_probe(mut self, upstream: Arc<dyn Upstream>, health_url: Url) -> Self {
        self.probe = Some((upstream, health_url));
        self
    }

    /// Handle that stops the worker when notified.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Spawn the worker loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "sync worker started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        tracing::info!("sync worker received shutdown signal");
                        break;
                    }
                    _ = self.connectivity.regained() => {
                        self.drain("connectivity regained").await;
                    }
                    _ = ticker.tick() => {
                        if self.connectivity.is_online() {
                            self.drain("interval").await;
                        } else if !self.probe_upstream().await {
                            tracing::debug!("skipping sync - upstream unreachable");
                        }
                        // A successful probe flips the monitor online, which
                        // fires `regained` on the next iteration.
                    }
                }
            }

            tracing::info!("sync worker stopped");
        })
    }

    async fn drain(&self, trigger: &'static str) {
        match self.coordinator.drain().await {
            Ok(report) if !report.is_empty() => {
                tracing::debug!(trigger, attempted = report.attempted(), "sync pass finished");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(trigger, error = %err, "sync pass failed"),
        }
    }

    /// Returns whether the upstream answered. Without a probe configured the
    /// drain itself serves as the probe.
    async fn probe_upstream(&self) -> bool {
        let Some((upstream, url)) = &self.probe else {
            self.drain("interval").await;
            return self.connectivity.is_online();
        };

        match upstream.send(&RequestSnapshot::new("GET", url.clone())).await {
            Ok(_) => {
                self.connectivity.set_online();
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "health probe failed");
                false
            }
        }
    }
}
