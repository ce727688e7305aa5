//! Transport-neutral snapshots of intercepted requests and responses.
//!
//! These types are what the router, the stores and the upstream transport
//! exchange. They deliberately avoid any HTTP framework types so the same
//! values can be persisted, replayed and compared in tests.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

/// Header name used to carry the queued item identity upstream.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

/// Headers that only describe a single hop and must not be stored or replayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Ordered, case-insensitive header list.
///
/// Multiple values for one name are kept as separate entries, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a value, keeping existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into().to_ascii_lowercase(), value.into()));
    }

    /// Replace all values for `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Copy of this list without connection-scoped headers.
    pub fn end_to_end(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !HOP_BY_HOP.iter().any(|h| k.eq_ignore_ascii_case(h)))
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (k, v) in iter {
            list.append(k, v);
        }
        list
    }
}

/// An intercepted request, fully buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSnapshot {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute target URL.
    pub url: Url,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl RequestSnapshot {
    pub fn new(method: impl AsRef<str>, url: Url) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url,
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    /// Parse an absolute URL string into a request.
    pub fn parse(method: impl AsRef<str>, url: &str) -> Result<Self, CoreError> {
        let url = Url::parse(url).map_err(|e| CoreError::invalid_url(format!("{url}: {e}")))?;
        Ok(Self::new(method, url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// `GET`, `HEAD` and `OPTIONS` never change server state.
    pub fn is_read(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "HEAD" | "OPTIONS")
    }

    /// Canonical cache key: the method-qualified URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Full-page navigation (as opposed to a subresource or API fetch).
    pub fn is_navigation(&self) -> bool {
        if self.method != "GET" {
            return false;
        }
        if self
            .headers
            .get("sec-fetch-mode")
            .is_some_and(|m| m.eq_ignore_ascii_case("navigate"))
        {
            return true;
        }
        self.headers
            .get("accept")
            .is_some_and(|a| a.to_ascii_lowercase().contains("text/html"))
    }
}

/// A complete response, either from the network or synthesized locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: Vec::new(),
        }
    }

    /// JSON response with the given status.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut headers = HeaderList::new();
        headers.set("content-type", "application/json");
        Self {
            status,
            headers,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
