//! Connectivity detection and state management.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Connectivity state as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The last upstream exchange produced a response.
    Online,
    /// The last upstream exchange failed at the transport level.
    Offline,
}

/// Shared connectivity state.
///
/// Updated by every routed request and by the health probe. An
/// `offline → online` transition fires the connectivity-regained signal
/// that the sync worker waits on.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    regained: Notify,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Starts online; the first failed exchange flips it.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            regained: Notify::new(),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        if self.is_online() {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Mark the upstream reachable. Returns `true` on an `offline → online`
    /// transition.
    pub fn set_online(&self) -> bool {
        let was_online = self.online.swap(true, Ordering::AcqRel);
        if !was_online {
            tracing::info!("connectivity regained");
            // notify_one stores a permit if the worker is busy draining.
            self.regained.notify_one();
        }
        !was_online
    }

    /// Mark the upstream unreachable. Returns `true` on an `online → offline`
    /// transition.
    pub fn set_offline(&self) -> bool {
        let was_online = self.online.swap(false, Ordering::AcqRel);
        if was_online {
            tracing::warn!("connectivity lost; serving from cache and queueing mutations");
        }
        was_online
    }

    /// Resolves on the next `offline → online` transition (or immediately if
    /// one happened since the last wait).
    pub async fn regained(&self) {
        self.regained.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn transitions_are_reported_once() {
        let monitor = ConnectivityMonitor::new();
        assert_eq!(monitor.state(), ConnectivityState::Online);

        assert!(monitor.set_offline());
        assert!(!monitor.set_offline());
        assert_eq!(monitor.state(), ConnectivityState::Offline);

        assert!(monitor.set_online());
        assert!(!monitor.set_online());
    }

    #[tokio::test]
    async fn regained_fires_on_transition() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.set_offline();

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.regained().await })
        };
        tokio::task::yield_now().await;
        monitor.set_online();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("regained signal not delivered")
            .unwrap();
    }

    #[tokio::test]
    async fn staying_online_does_not_signal() {
        let monitor = ConnectivityMonitor::new();
        monitor.set_online();

        let waited = tokio::time::timeout(Duration::from_millis(50), monitor.regained()).await;
        assert!(waited.is_err());
    }
}
