//! Durable, ordered record of mutations awaiting delivery.
//!
//! Items move through a small state machine:
//!
//! ```text
//! pending ──claim──▶ in_flight ──complete──▶ (removed)
//!    ▲                   │
//!    └──────release──────┤
//!                        └──fail_terminal──▶ failed_terminal ──acknowledge──▶ (removed)
//!    ▲                                              │
//!    └────────────────────requeue───────────────────┘
//! ```
//!
//! Every transition is a compare-and-set on the item's current status, so
//! two actors can never both claim the same item.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryMutationQueue;
pub use sqlite::SqliteMutationQueue;
pub use r#trait::{MutationQueue, QueueItem, QueueStats, QueueStatus};
