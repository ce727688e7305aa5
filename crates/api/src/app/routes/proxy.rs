//! Fallback handler: every non-control request goes through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, Request};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use harbor_agent::Routed;
use harbor_core::{HeaderList, RequestSnapshot};
use url::Url;

use crate::app::errors::json_error;
use crate::app::services::AppServices;

/// Requests are buffered in full so they can be persisted and replayed.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Response header naming where a routed response came from.
pub const SOURCE_HEADER: &str = "x-harbor-source";

pub async fn forward(
    Extension(services): Extension<Arc<AppServices>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return json_error(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large", e.to_string());
        }
    };

    let url = upstream_target(services.router.origin(), &parts.uri);

    let mut snapshot = RequestSnapshot::new(parts.method.as_str(), url).with_body(body.to_vec());
    snapshot.headers = header_list(&parts.headers);

    into_response(services.router.handle(snapshot).await)
}

/// The upstream URL for a request target.
///
/// Only the path and query are taken from the client; scheme, host and port
/// always come from the configured origin, so a target such as
/// `//elsewhere/x` stays a path on the origin.
fn upstream_target(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

/// Header values that are not UTF-8 cannot be stored or replayed.
fn header_list(headers: &HeaderMap) -> HeaderList {
    let mut list = HeaderList::new();
    for (name, value) in headers.iter() {
        match value.to_str() {
            Ok(value) => list.append(name.as_str(), value),
            Err(_) => tracing::debug!(header = %name, "dropping non-UTF-8 request header"),
        }
    }
    list
}

fn into_response(routed: Routed) -> Response {
    let mut builder = Response::builder().status(routed.response.status);
    for (name, value) in routed.response.headers.iter() {
        builder = builder.header(name, value);
    }
    builder = builder.header(SOURCE_HEADER, routed.source.as_str());

    builder
        .body(Body::from(routed.response.body))
        .unwrap_or_else(|e| json_error(StatusCode::BAD_GATEWAY, "invalid_upstream_response", e.to_string()))
}
