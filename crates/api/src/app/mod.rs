//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, transport, router, coordinator and bus
//! - `routes/`: control-plane handlers plus the proxy fallback
//! - `dto.rs`: control-plane request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// `/__harbor/*` is handled locally; everything else is intercepted and
/// routed upstream.
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .nest(routes::CONTROL_PREFIX, routes::control_router())
        .fallback(routes::proxy::forward)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use harbor_agent::HarborConfig;
    use tower::ServiceExt;

    fn app() -> Router {
        let services = AppServices::in_memory(HarborConfig::default()).unwrap();
        build_app(Arc::new(services))
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_generation_and_connectivity() {
        let resp = app()
            .oneshot(Request::get("/__harbor/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connectivity"], "online");
        assert_eq!(body["queue"]["pending"], 0);
    }

    #[tokio::test]
    async fn malformed_item_id_is_rejected() {
        let resp = app()
            .oneshot(
                Request::post("/__harbor/queue/not-a-uuid/requeue")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "invalid_id");
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let id = harbor_core::ItemId::new();
        let resp = app()
            .oneshot(
                Request::delete(format!("/__harbor/queue/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn push_requires_a_title() {
        let resp = app()
            .oneshot(
                Request::post("/__harbor/push")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"title":" ","body":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_queue_sync_returns_empty_report() {
        let resp = app()
            .oneshot(Request::post("/__harbor/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["delivered"], serde_json::json!([]));
        assert_eq!(body["skipped"], serde_json::json!([]));
    }
}
