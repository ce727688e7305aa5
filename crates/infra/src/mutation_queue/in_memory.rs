use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use harbor_core::ItemId;

use super::r#trait::{MutationQueue, QueueItem, QueueStats, QueueStatus};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    /// Keyed by submission sequence, so iteration is FIFO.
    items: BTreeMap<i64, QueueItem>,
    next_seq: i64,
}

impl State {
    fn find_mut(&mut self, id: ItemId) -> Option<&mut QueueItem> {
        self.items.values_mut().find(|i| i.id == id)
    }

    fn seq_of(&self, id: ItemId) -> Option<i64> {
        self.items.values().find(|i| i.id == id).map(|i| i.seq)
    }
}

/// In-memory mutation queue.
///
/// Intended for tests/dev. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryMutationQueue {
    state: Mutex<State>,
}

impl InMemoryMutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::storage("queue lock poisoned"))
    }

    /// Apply `f` if the item is currently `expected`.
    fn transition(
        &self,
        id: ItemId,
        expected: QueueStatus,
        f: impl FnOnce(&mut QueueItem),
    ) -> Result<QueueItem, StoreError> {
        let mut state = self.lock()?;
        let item = state.find_mut(id).ok_or(StoreError::NotFound(id))?;
        if item.status != expected {
            return Err(StoreError::InvalidTransition {
                id,
                expected: expected.as_str(),
                actual: item.status.as_str().to_string(),
            });
        }
        f(item);
        Ok(item.clone())
    }

    /// Remove the item if it is currently `expected`.
    fn remove_if(
        &self,
        id: ItemId,
        expected: QueueStatus,
        final_status: QueueStatus,
    ) -> Result<QueueItem, StoreError> {
        let mut state = self.lock()?;
        let seq = state.seq_of(id).ok_or(StoreError::NotFound(id))?;
        let actual = state.items[&seq].status;
        if actual != expected {
            return Err(StoreError::InvalidTransition {
                id,
                expected: expected.as_str(),
                actual: actual.as_str().to_string(),
            });
        }
        let mut item = state
            .items
            .remove(&seq)
            .ok_or(StoreError::NotFound(id))?;
        item.status = final_status;
        Ok(item)
    }
}

#[async_trait::async_trait]
impl MutationQueue for InMemoryMutationQueue {
    async fn enqueue(&self, mut item: QueueItem) -> Result<QueueItem, StoreError> {
        let mut state = self.lock()?;
        if state.seq_of(item.id).is_some() {
            return Err(StoreError::storage(format!("duplicate queue item {}", item.id)));
        }
        state.next_seq += 1;
        item.seq = state.next_seq;
        item.status = QueueStatus::Pending;
        state.items.insert(item.seq, item.clone());
        Ok(item)
    }

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, StoreError> {
        let state = self.lock()?;
        Ok(state.items.values().find(|i| i.id == id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .items
            .values()
            .filter(|i| i.status == QueueStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_failed(&self) -> Result<Vec<QueueItem>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .items
            .values()
            .filter(|i| i.status == QueueStatus::FailedTerminal)
            .cloned()
            .collect())
    }

    async fn claim(&self, id: ItemId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.find_mut(id) {
            Some(item) if item.status == QueueStatus::Pending => {
                item.status = QueueStatus::InFlight;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        self.remove_if(id, QueueStatus::InFlight, QueueStatus::Delivered)
    }

    async fn release(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError> {
        self.transition(id, QueueStatus::InFlight, |item| {
            item.status = QueueStatus::Pending;
            item.attempts += 1;
            item.last_error = Some(error.to_string());
        })
    }

    async fn fail_terminal(&self, id: ItemId, error: &str) -> Result<QueueItem, StoreError> {
        self.transition(id, QueueStatus::InFlight, |item| {
            item.status = QueueStatus::FailedTerminal;
            item.attempts += 1;
            item.last_error = Some(error.to_string());
        })
    }

    async fn acknowledge_failure(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        self.remove_if(id, QueueStatus::FailedTerminal, QueueStatus::FailedTerminal)
    }

    async fn requeue(&self, id: ItemId) -> Result<QueueItem, StoreError> {
        self.transition(id, QueueStatus::FailedTerminal, |item| {
            item.status = QueueStatus::Pending;
            item.attempts = 0;
            item.last_error = None;
        })
    }

    async fn recover_in_flight(&self) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let mut recovered = 0;
        for item in state.items.values_mut() {
            if item.status == QueueStatus::InFlight {
                item.status = QueueStatus::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        let state = self.lock()?;
        let mut stats = QueueStats::default();
        for item in state.items.values() {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::InFlight => stats.in_flight += 1,
                QueueStatus::FailedTerminal => stats.failed_terminal += 1,
                QueueStatus::Delivered => {}
            }
        }
        Ok(stats)
    }
}
