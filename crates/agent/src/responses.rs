//! Responses synthesized locally when the network cannot answer.

use harbor_core::{ItemId, ResponseSnapshot};
use serde_json::json;

/// Stable machine-readable kind for the offline payload.
pub const OFFLINE_CODE: &str = "OFFLINE";

/// `202` returned when a mutation was durably queued instead of delivered.
pub fn queued(item_id: ItemId) -> ResponseSnapshot {
    ResponseSnapshot::json(
        202,
        &json!({
            "success": true,
            "queued": true,
            "itemId": item_id.to_string(),
            "message": "Request queued; it will be delivered when connectivity returns",
        }),
    )
}

/// `503` structured offline error for API reads with nothing cached.
pub fn offline() -> ResponseSnapshot {
    ResponseSnapshot::json(
        503,
        &json!({
            "success": false,
            "error": {
                "code": OFFLINE_CODE,
                "message": "Network unavailable and no cached response exists",
            },
        }),
    )
}

/// `503` for a static asset that is neither cached nor reachable.
///
/// Callers treat this as retryable; the body carries no contract.
pub fn unavailable() -> ResponseSnapshot {
    ResponseSnapshot::new(503)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header("cache-control", "no-store")
        .with_body("Service Unavailable")
}

/// `502` for a pass-through request whose upstream exchange failed.
///
/// Pass-through traffic carries no durability guarantee; the caller sees the
/// failure directly.
pub fn bad_gateway(message: &str) -> ResponseSnapshot {
    ResponseSnapshot::json(
        502,
        &json!({
            "success": false,
            "error": {
                "code": "UPSTREAM_UNREACHABLE",
                "message": message,
            },
        }),
    )
}
