use std::sync::Arc;

use axum::extract::Extension;
use axum::Json;

use crate::app::dto::HealthResponse;
use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connectivity: services.connectivity.state(),
        generation: services.generation.clone(),
        upstream: services.router.origin().to_string(),
        queue: services.queue_stats().await,
    })
}
