//! Network seam between Harbor and the origin.
//!
//! The router and the sync coordinator only see [`Upstream`]; production
//! wires [`ReqwestUpstream`], tests wire fakes that can be switched offline.

use std::time::Duration;

use harbor_core::{HeaderList, RequestSnapshot, ResponseSnapshot};
use reqwest::Method;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// No HTTP response was obtained (connection refused, DNS, reset, timeout).
    #[error("upstream unreachable: {0}")]
    Transport(String),

    /// The snapshot could not be expressed as an outgoing request.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, UpstreamError::Transport(_))
    }
}

/// Sends a buffered request and buffers the response.
///
/// Any HTTP status, including 4xx/5xx, is a successful send; only failure to
/// obtain a response is an error.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, UpstreamError>;
}

/// `reqwest`-backed upstream.
///
/// Redirects are not followed so the caller sees exactly what the origin
/// returned.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new() -> Result<Self, UpstreamError> {
        Self::build(None)
    }

    /// Upstream with a per-request timeout; a timeout counts as transport
    /// failure.
    pub fn with_timeout(timeout: Duration) -> Result<Self, UpstreamError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| UpstreamError::InvalidRequest(format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Upstream for ReqwestUpstream {
    async fn send(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, UpstreamError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| UpstreamError::InvalidRequest(format!("{}: {e}", request.method)))?;

        let mut req = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.end_to_end().iter() {
            req = req.header(name, value);
        }
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_builder() {
                UpstreamError::InvalidRequest(e.to_string())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let headers: HeaderList = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        // A body cut off mid-stream means no usable response was obtained.
        let body = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to read response body: {e}")))?;

        Ok(ResponseSnapshot {
            status,
            headers: headers.end_to_end(),
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // Port 9 (discard) on loopback is not expected to accept connections.
        let upstream = ReqwestUpstream::with_timeout(Duration::from_secs(2)).unwrap();
        let req = RequestSnapshot::parse("GET", "http://127.0.0.1:9/health").unwrap();

        let err = upstream.send(&req).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected_before_sending() {
        let upstream = ReqwestUpstream::new().unwrap();
        let req = RequestSnapshot::parse("BAD METHOD", "http://127.0.0.1:9/").unwrap();

        let err = upstream.send(&req).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidRequest(_)));
    }
}
