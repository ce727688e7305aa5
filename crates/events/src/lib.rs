//! Outcome notifications and the channel that fans them out.
//!
//! Notifications are ephemeral. Correctness never depends on one being
//! received: surfaces reconcile on their next refresh.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{NotificationBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryNotificationBus};
pub use notification::{NotificationEvent, NotificationKind, PushAlert};
