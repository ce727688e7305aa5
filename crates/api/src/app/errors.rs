use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use harbor_agent::SyncError;
use harbor_infra::StoreError;

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::Store(StoreError::NotFound(id)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("queue item {id} not found"))
        }
        SyncError::Store(e @ StoreError::InvalidTransition { .. }) => {
            json_error(StatusCode::CONFLICT, "invalid_state", e.to_string())
        }
        SyncError::Store(e) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
