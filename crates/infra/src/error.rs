//! Storage error model shared by the cache store and the mutation queue.

use harbor_core::ItemId;
use thiserror::Error;

/// Durable-storage failure.
///
/// Callers treat any of these as fatal to the single operation only; the
/// router degrades to network pass-through instead of failing closed.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("queue item not found: {0}")]
    NotFound(ItemId),

    /// Compare-and-set on the item status did not match.
    #[error("queue item {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: ItemId,
        expected: &'static str,
        actual: String,
    },

    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The backing store is unavailable or rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// Map a SQLx error, tagging it with the operation that failed.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::Storage(format!("{operation}: {other}")),
    }
}
