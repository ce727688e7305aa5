use core::str::FromStr;

use chrono::{DateTime, Utc};
use harbor_core::{CoreError, HeaderList, ItemId, RequestSnapshot};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StoreError;

/// Delivery status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InFlight,
    /// Acknowledged upstream; only ever observed on the value returned by
    /// `complete`, since delivered items are removed.
    Delivered,
    FailedTerminal,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InFlight => "in_flight",
            QueueStatus::Delivered => "delivered",
            QueueStatus::FailedTerminal => "failed_terminal",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "in_flight" => Ok(QueueStatus::InFlight),
            "delivered" => Ok(QueueStatus::Delivered),
            "failed_terminal" => Ok(QueueStatus::FailedTerminal),
            other => Err(StoreError::corrupt(format!("unknown queue status '{other}'"))),
        }
    }
}

/// A mutation that could not be delivered synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: ItemId,
    /// Submission sequence assigned by the store on enqueue (0 before).
    pub seq: i64,
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Capture `request` as a pending item with identity `id`.
    ///
    /// Connection-scoped headers are dropped; everything else is replayed
    /// verbatim.
    pub fn from_request(id: ItemId, request: &RequestSnapshot) -> Self {
        Self {
            id,
            seq: 0,
            method: request.method.clone(),
            url: request.url.to_string(),
            headers: request.headers.end_to_end(),
            body: request.body.clone(),
            submitted_at: Utc::now(),
            status: QueueStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// Rebuild the request for replay.
    pub fn to_request(&self) -> Result<RequestSnapshot, CoreError> {
        let mut request = RequestSnapshot::parse(&self.method, &self.url)?;
        request.headers = self.headers.clone();
        request.body = self.body.clone();
        Ok(request)
    }

    /// Logical resource the mutation targets: the URL path without query.
    ///
    /// Items sharing a resource key are replayed strictly in submission
    /// order.
    pub fn resource_key(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => url.path().trim_end_matches('/').to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

/// Queue depth per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub failed_terminal: usize,
}

/// Durable mutation queue.
///
/// All operations are atomic per item. Ordering across items is the
/// submission sequence.
#[async_trait::async_trait]
pub trait MutationQueue: Send + Sync {
    /// Persist a new pending item; returns it with its sequence assigned.
    async fn enqueue(&self, item: QueueItem) -> Result<QueueItem, StoreError>;

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, StoreError>;

    /// Pending items in submission order.
    async fn list_pending(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// Terminally failed items awaiting operator action, oldest first.
    async fn list_failed(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// `pending → in_flight`. Returns `false` if the item is not pending.
    async fn claim(&self, id: ItemId) -> Result<bool, StoreError>;

    /// `in_flight → delivered`: removes the item and returns it.
    async fn complete(&self, id: ItemId) -> Result<QueueItem, StoreError>;

    /// `in_flight → pending`, counting the failed attempt.
    async fn release(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError>;

    /// `in_flight → failed_terminal`, counting the failed attempt.
    async fn fail_terminal(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError>;

    /// Remove a `failed_terminal` item after an operator has seen it.
    async fn acknowledge_failure(&self, id: ItemId) -> Result<QueueItem, StoreError>;

    /// `failed_terminal → pending` with a fresh retry budget.
    async fn requeue(&self, id: ItemId) -> Result<QueueItem, StoreError>;

    /// Return items orphaned `in_flight` by a previous process to `pending`.
    async fn recover_in_flight(&self) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<QueueStats, StoreError>;
}
