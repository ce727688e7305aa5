//! `harbor-agent`
//!
//! **Responsibility:** the interception layer proper.
//!
//! This crate wires the stores from `harbor-infra` and the bus from
//! `harbor-events` into:
//! - the request router (cache-first, network-first, queue-on-failure)
//! - the sync coordinator that replays queued mutations
//! - the background sync worker that owns the replay triggers
//! - activation (precache, generation rollover, crash recovery)
//!
//! Nothing here knows about HTTP servers; `harbor-api` adapts it to axum.

pub mod activation;
pub mod config;
pub mod connectivity;
pub mod responses;
pub mod router;
pub mod sync_coordinator;
pub mod sync_worker;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use harbor_events::{InMemoryBusError, NotificationBus, NotificationEvent};

/// Shared handle to the notification channel.
pub type Notifier = Arc<dyn NotificationBus<NotificationEvent, Error = InMemoryBusError>>;

pub use activation::{ActivationReport, activate};
pub use config::{ConfigError, HarborConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use router::{RequestRouter, ResponseSource, Routed};
pub use sync_coordinator::{DrainReport, QueueSnapshot, SyncCoordinator, SyncError};
pub use sync_worker::SyncWorker;
