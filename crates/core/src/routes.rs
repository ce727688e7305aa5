//! Request classification.
//!
//! The surrounding application supplies two small static tables at build
//! time (cacheable reads and syncable mutations). Together with the API
//! prefix and the static-asset extensions they decide which strategy the
//! router applies to an intercepted request.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::http::RequestSnapshot;

const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "html", "htm", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff",
    "woff2", "ttf", "otf", "webmanifest", "map",
];

/// Which strategy an intercepted request is handled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Cache-first against the static partition.
    StaticAsset { navigation: bool },
    /// Network-first with fallback to the API partition.
    ApiRead { cacheable: bool },
    /// Mutation on a syncable route: deliver now or queue.
    SyncableMutation,
    /// Not intercepted.
    PassThrough(PassThroughReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    CrossOrigin,
    NonSyncableMutation,
    Unclassified,
}

/// Classification tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    /// Path prefix under which reads use network-first.
    pub api_prefix: String,
    /// Lower-case file extensions (without dot) served cache-first.
    pub static_extensions: Vec<String>,
    /// Path of the cached application shell served to offline navigations.
    pub app_shell: String,
    /// API read prefixes whose successful responses are written to the cache.
    pub cacheable_reads: Vec<String>,
    /// Mutation prefixes eligible for queue-and-replay.
    pub syncable_mutations: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            static_extensions: DEFAULT_STATIC_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            app_shell: "/index.html".to_string(),
            cacheable_reads: Vec::new(),
            syncable_mutations: Vec::new(),
        }
    }
}

impl RouteTable {
    pub fn with_cacheable_read(mut self, prefix: impl Into<String>) -> Self {
        self.cacheable_reads.push(prefix.into());
        self
    }

    pub fn with_syncable_mutation(mut self, prefix: impl Into<String>) -> Self {
        self.syncable_mutations.push(prefix.into());
        self
    }

    /// Parse a JSON route table (missing fields fall back to defaults).
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let table: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::invalid_route(format!("route table: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    /// Every configured path must be absolute.
    pub fn validate(&self) -> Result<(), CoreError> {
        let paths = std::iter::once(&self.api_prefix)
            .chain(std::iter::once(&self.app_shell))
            .chain(self.cacheable_reads.iter())
            .chain(self.syncable_mutations.iter());
        for p in paths {
            if !p.starts_with('/') {
                return Err(CoreError::invalid_route(format!(
                    "path must start with '/': {p:?}"
                )));
            }
        }
        Ok(())
    }

    /// Decide how `req` is handled when the configured origin is `origin`.
    pub fn classify(&self, req: &RequestSnapshot, origin: &Url) -> ResourceClass {
        if req.url.origin() != origin.origin() {
            return ResourceClass::PassThrough(PassThroughReason::CrossOrigin);
        }

        let path = req.path();

        if !req.is_read() {
            return if self.is_syncable(path) {
                ResourceClass::SyncableMutation
            } else {
                ResourceClass::PassThrough(PassThroughReason::NonSyncableMutation)
            };
        }

        if req.method != "GET" {
            return ResourceClass::PassThrough(PassThroughReason::Unclassified);
        }

        let under_api = prefix_matches(&self.api_prefix, path);

        if !under_api && self.is_static_path(path) {
            return ResourceClass::StaticAsset {
                navigation: req.is_navigation(),
            };
        }

        if under_api {
            return ResourceClass::ApiRead {
                cacheable: self.is_cacheable(path),
            };
        }

        if req.is_navigation() {
            return ResourceClass::StaticAsset { navigation: true };
        }

        ResourceClass::PassThrough(PassThroughReason::Unclassified)
    }

    pub fn is_cacheable(&self, path: &str) -> bool {
        self.cacheable_reads.iter().any(|p| prefix_matches(p, path))
    }

    pub fn is_syncable(&self, path: &str) -> bool {
        self.syncable_mutations.iter().any(|p| prefix_matches(p, path))
    }

    /// Static by extension of the last path segment, or the shell itself.
    pub fn is_static_path(&self, path: &str) -> bool {
        if path == self.app_shell {
            return true;
        }
        let last = path.rsplit('/').next().unwrap_or_default();
        match last.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .static_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

/// Segment-aware prefix match: `/api/orders` matches `/api/orders` and
/// `/api/orders/7` but not `/api/ordersX`.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
