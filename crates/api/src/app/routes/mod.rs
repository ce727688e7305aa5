use axum::Router;
use axum::routing::{delete, get, post};

pub mod notifications;
pub mod proxy;
pub mod queue;
pub mod system;

/// Control plane, nested under [`CONTROL_PREFIX`].
pub fn control_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/sync", post(queue::sync_now))
        .route("/queue", get(queue::list))
        .route("/queue/:id/requeue", post(queue::requeue))
        .route("/queue/:id", delete(queue::acknowledge))
        .route("/push", post(notifications::push))
        .route("/events", get(notifications::stream_events))
}

/// Path prefix reserved for Harbor's own endpoints; never forwarded.
pub const CONTROL_PREFIX: &str = "/__harbor";
