//! Notification events.

use chrono::{DateTime, Utc};
use harbor_core::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// A queued mutation was delivered.
    SyncSuccess,
    /// Delivery failed; the item stays pending until the next trigger.
    #[serde(rename = "SYNC_RETRY")]
    SyncRetryScheduled,
    /// Delivery failed terminally; the item awaits operator action.
    SyncFailed,
    /// Externally triggered alert.
    #[serde(rename = "PUSH")]
    PushMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SyncSuccess => "SYNC_SUCCESS",
            NotificationKind::SyncRetryScheduled => "SYNC_RETRY",
            NotificationKind::SyncFailed => "SYNC_FAILED",
            NotificationKind::PushMessage => "PUSH",
        }
    }
}

/// User-visible alert delivered through the push trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAlert {
    pub title: String,
    pub body: String,
    /// Deep link used to focus or open a client surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Ephemeral outcome event broadcast to attached surfaces.
///
/// Serialises as `{ "type": ..., "itemId": ..., "at": ..., <payload fields> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(rename = "itemId", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NotificationEvent {
    fn new(kind: NotificationKind, item_id: Option<ItemId>) -> Self {
        Self {
            kind,
            item_id,
            at: Utc::now(),
            payload: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Delivered; carries a short summary of the upstream response.
    pub fn sync_success(item_id: ItemId, status: u16) -> Self {
        Self::new(NotificationKind::SyncSuccess, Some(item_id)).with("status", status)
    }

    pub fn sync_retry(item_id: ItemId, attempts: u32, error: impl Into<String>) -> Self {
        Self::new(NotificationKind::SyncRetryScheduled, Some(item_id))
            .with("attempts", attempts)
            .with("error", error.into())
    }

    pub fn sync_failed(item_id: ItemId, attempts: u32, error: impl Into<String>) -> Self {
        Self::new(NotificationKind::SyncFailed, Some(item_id))
            .with("attempts", attempts)
            .with("error", error.into())
    }

    pub fn push(alert: PushAlert) -> Self {
        let mut event = Self::new(NotificationKind::PushMessage, None)
            .with("title", alert.title)
            .with("body", alert.body);
        if let Some(target) = alert.target {
            event = event.with("target", target);
        }
        event
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
