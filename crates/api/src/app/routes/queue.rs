//! Queue inspection and operator actions.

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use harbor_core::ItemId;

use crate::app::errors::{json_error, sync_error_to_response};
use crate::app::services::AppServices;

/// POST /__harbor/sync
///
/// Explicit replay signal: runs one drain and returns its report.
pub async fn sync_now(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.coordinator.drain().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => sync_error_to_response(e),
    }
}

/// GET /__harbor/queue
pub async fn list(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.coordinator.snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => sync_error_to_response(e),
    }
}

/// POST /__harbor/queue/:id/requeue
pub async fn requeue(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.coordinator.requeue(id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => sync_error_to_response(e),
    }
}

/// DELETE /__harbor/queue/:id
///
/// Acknowledge a terminal failure; the item is removed.
pub async fn acknowledge(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.coordinator.acknowledge(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => sync_error_to_response(e),
    }
}

fn parse_id(raw: &str) -> Result<ItemId, axum::response::Response> {
    raw.parse::<ItemId>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
