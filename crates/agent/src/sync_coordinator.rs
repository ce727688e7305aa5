//! Replays the mutation queue.
//!
//! A drain walks every `pending` item in submission order and gives each one
//! delivery attempt:
//!
//! - `2xx`/`3xx`: delivered, removed, `SYNC_SUCCESS`
//! - transport error, `5xx`, `408`, `429`: released for the next trigger
//!   (`SYNC_RETRY`), or `failed_terminal` once the retry budget is spent
//!   (`SYNC_FAILED`)
//! - any other `4xx`: `failed_terminal` immediately (`SYNC_FAILED`)
//!
//! Once an item fails, later items for the same resource are skipped for the
//! rest of the drain so per-resource order holds. Unrelated items proceed.
//!
//! Every drain starts by returning `in_flight` items to `pending`. Only a
//! drain claims items and drains never overlap, so anything still in flight
//! at that point was left behind by a queue write that failed mid-replay.

use std::collections::HashSet;
use std::sync::Arc;

use harbor_core::http::IDEMPOTENCY_KEY;
use harbor_core::{ItemId, ResponseSnapshot};
use harbor_events::{NotificationBus, NotificationEvent};
use harbor_infra::{MutationQueue, QueueItem, QueueStats, StoreError, Upstream, UpstreamError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::Notifier;
use crate::connectivity::ConnectivityMonitor;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one drain did, by item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub delivered: Vec<ItemId>,
    pub retried: Vec<ItemId>,
    pub failed: Vec<ItemId>,
    /// Not attempted: held back behind a failed item for the same resource,
    /// or claimed by someone else.
    pub skipped: Vec<ItemId>,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.retried.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0 && self.skipped.is_empty()
    }
}

/// Queue contents for operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub stats: QueueStats,
    pub pending: Vec<QueueItem>,
    pub failed: Vec<QueueItem>,
}

/// How a single delivery attempt is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Delivered(u16),
    Retryable(String),
    Rejected(String),
}

fn classify(result: &Result<ResponseSnapshot, UpstreamError>) -> Outcome {
    match result {
        Ok(resp) if (200..400).contains(&resp.status) => Outcome::Delivered(resp.status),
        Ok(resp) if resp.status >= 500 || resp.status == 408 || resp.status == 429 => {
            Outcome::Retryable(format!("HTTP {}", resp.status))
        }
        Ok(resp) => Outcome::Rejected(format!("HTTP {}", resp.status)),
        Err(UpstreamError::Transport(e)) => Outcome::Retryable(e.clone()),
        Err(UpstreamError::InvalidRequest(e)) => Outcome::Rejected(e.clone()),
    }
}

enum Replayed {
    Delivered,
    Retried,
    Failed,
    NotClaimed,
}

pub struct SyncCoordinator {
    queue: Arc<dyn MutationQueue>,
    upstream: Arc<dyn Upstream>,
    bus: Notifier,
    connectivity: Arc<ConnectivityMonitor>,
    max_attempts: u32,
    /// One drain at a time; concurrent triggers wait and then see the
    /// updated queue.
    drain_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<dyn MutationQueue>,
        upstream: Arc<dyn Upstream>,
        bus: Notifier,
        connectivity: Arc<ConnectivityMonitor>,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            upstream,
            bus,
            connectivity,
            max_attempts: max_attempts.max(1),
            drain_lock: Mutex::new(()),
        }
    }

    /// Replay every pending item once.
    pub async fn drain(&self) -> Result<DrainReport, SyncError> {
        let _guard = self.drain_lock.lock().await;

        match self.queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(recovered) => {
                tracing::warn!(recovered, "returned stranded in-flight items to pending");
            }
            Err(err) => tracing::warn!(error = %err, "in-flight recovery failed"),
        }

        let pending = self.queue.list_pending().await?;
        let mut report = DrainReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        tracing::info!(pending = pending.len(), "draining mutation queue");

        let mut held_back: HashSet<String> = HashSet::new();
        for item in pending {
            let id = item.id;
            let resource = item.resource_key();
            if held_back.contains(&resource) {
                tracing::debug!(item_id = %id, %resource, "held back behind earlier failure");
                report.skipped.push(id);
                continue;
            }

            match self.replay(item).await {
                Ok(Replayed::Delivered) => report.delivered.push(id),
                Ok(Replayed::Retried) => {
                    report.retried.push(id);
                    held_back.insert(resource);
                }
                Ok(Replayed::Failed) => {
                    report.failed.push(id);
                    held_back.insert(resource);
                }
                Ok(Replayed::NotClaimed) => {
                    report.skipped.push(id);
                    held_back.insert(resource);
                }
                Err(err) => {
                    tracing::warn!(item_id = %id, error = %err, "queue update failed during replay");
                    report.skipped.push(id);
                    held_back.insert(resource);
                }
            }
        }

        tracing::info!(
            delivered = report.delivered.len(),
            retried = report.retried.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "drain complete"
        );
        Ok(report)
    }

    async fn replay(&self, item: QueueItem) -> Result<Replayed, StoreError> {
        if !self.queue.claim(item.id).await? {
            tracing::debug!(item_id = %item.id, "item no longer pending; skipping");
            return Ok(Replayed::NotClaimed);
        }

        let result = match item.to_request() {
            Ok(mut request) => {
                if !request.headers.contains(IDEMPOTENCY_KEY) {
                    request.headers.set(IDEMPOTENCY_KEY, item.id.to_string());
                }
                self.upstream.send(&request).await
            }
            Err(e) => Err(UpstreamError::InvalidRequest(e.to_string())),
        };

        match &result {
            Ok(_) => {
                self.connectivity.set_online();
            }
            Err(e) if e.is_transport() => {
                self.connectivity.set_offline();
            }
            Err(_) => {}
        }

        match classify(&result) {
            Outcome::Delivered(status) => {
                self.queue.complete(item.id).await?;
                tracing::info!(item_id = %item.id, status, "queued mutation delivered");
                self.notify(NotificationEvent::sync_success(item.id, status));
                Ok(Replayed::Delivered)
            }
            Outcome::Retryable(error) if item.attempts + 1 < self.max_attempts => {
                let released = self.queue.release(item.id, &error).await?;
                tracing::warn!(
                    item_id = %item.id,
                    attempts = released.attempts,
                    %error,
                    "delivery failed; will retry on next trigger"
                );
                self.notify(NotificationEvent::sync_retry(item.id, released.attempts, error));
                Ok(Replayed::Retried)
            }
            Outcome::Retryable(error) | Outcome::Rejected(error) => {
                let failed = self.queue.fail_terminal(item.id, &error).await?;
                tracing::error!(
                    item_id = %item.id,
                    attempts = failed.attempts,
                    %error,
                    "delivery failed terminally; awaiting operator action"
                );
                self.notify(NotificationEvent::sync_failed(item.id, failed.attempts, error));
                Ok(Replayed::Failed)
            }
        }
    }

    /// Return a terminally failed item to `pending` with a fresh budget.
    pub async fn requeue(&self, id: ItemId) -> Result<QueueItem, SyncError> {
        let item = self.queue.requeue(id).await?;
        tracing::info!(item_id = %id, "failed mutation requeued");
        Ok(item)
    }

    /// Drop a terminally failed item once an operator has seen it.
    pub async fn acknowledge(&self, id: ItemId) -> Result<QueueItem, SyncError> {
        let item = self.queue.acknowledge_failure(id).await?;
        tracing::info!(item_id = %id, "failed mutation acknowledged and removed");
        Ok(item)
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, SyncError> {
        Ok(QueueSnapshot {
            stats: self.queue.stats().await?,
            pending: self.queue.list_pending().await?,
            failed: self.queue.list_failed().await?,
        })
    }

    fn notify(&self, event: NotificationEvent) {
        if let Err(err) = self.bus.broadcast(event) {
            tracing::warn!(?err, "failed to broadcast notification");
        }
    }
}
