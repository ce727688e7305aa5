//! Control-plane request/response bodies.

use harbor_agent::ConnectivityState;
use harbor_core::StorageGeneration;
use harbor_infra::QueueStats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub connectivity: ConnectivityState,
    pub generation: StorageGeneration,
    pub upstream: String,
    /// Absent when the queue store cannot be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    /// Surfaces attached when the alert was broadcast.
    pub subscribers: usize,
}
