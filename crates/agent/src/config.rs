//! Runtime configuration, read from `HARBOR_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use harbor_core::{CoreError, RouteTable, StorageGeneration};
use thiserror::Error;
use url::Url;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8080";
pub const DEFAULT_MANIFEST: &str = "/,/index.html";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_HEALTH_PATH: &str = "/health";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("failed to read route table {path:?}: {source}")]
    RoutesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl ToString) -> Self {
        Self::Invalid {
            var,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarborConfig {
    pub listen_addr: SocketAddr,
    /// Origin every intercepted request is forwarded to.
    pub upstream_url: Url,
    /// Directory holding `harbor.db`; `None` means the OS data directory.
    pub data_dir: Option<PathBuf>,
    pub generation: StorageGeneration,
    /// Paths precached into the static partition at activation.
    pub manifest: Vec<String>,
    pub routes: RouteTable,
    pub sync_interval: Duration,
    /// Delivery attempts before a retryable item becomes `failed_terminal`.
    pub max_attempts: u32,
    /// Upstream path probed by the sync worker while offline.
    pub health_path: String,
}

impl Default for HarborConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            upstream_url: Url::parse(DEFAULT_UPSTREAM_URL).unwrap_or_else(|_| unreachable!()),
            data_dir: None,
            generation: default_generation(),
            manifest: parse_manifest(DEFAULT_MANIFEST),
            routes: RouteTable::default(),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

impl HarborConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values (unset or empty = default).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = var("HARBOR_LISTEN_ADDR") {
            config.listen_addr = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("HARBOR_LISTEN_ADDR", e))?;
        }

        if let Some(v) = var("HARBOR_UPSTREAM_URL") {
            let url = Url::parse(v.trim()).map_err(|e| ConfigError::invalid("HARBOR_UPSTREAM_URL", e))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "HARBOR_UPSTREAM_URL",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
            config.upstream_url = url;
        }

        if let Some(v) = var("HARBOR_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(v.trim()));
        }

        if let Some(v) = var("HARBOR_GENERATION") {
            config.generation =
                StorageGeneration::new(v).map_err(|e| ConfigError::invalid("HARBOR_GENERATION", e))?;
        }

        if let Some(v) = var("HARBOR_MANIFEST") {
            config.manifest = parse_manifest(&v);
            if let Some(bad) = config.manifest.iter().find(|p| !p.starts_with('/')) {
                return Err(ConfigError::invalid(
                    "HARBOR_MANIFEST",
                    format!("path must start with '/': {bad:?}"),
                ));
            }
        }

        if let Some(v) = var("HARBOR_ROUTES_FILE") {
            let path = PathBuf::from(v.trim());
            let json = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::RoutesFile { path: path.clone(), source })?;
            config.routes = RouteTable::from_json(&json)?;
        }

        if let Some(v) = var("HARBOR_SYNC_INTERVAL_SECS") {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("HARBOR_SYNC_INTERVAL_SECS", e))?;
            if secs == 0 {
                return Err(ConfigError::invalid("HARBOR_SYNC_INTERVAL_SECS", "must be positive"));
            }
            config.sync_interval = Duration::from_secs(secs);
        }

        if let Some(v) = var("HARBOR_MAX_ATTEMPTS") {
            let attempts: u32 = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("HARBOR_MAX_ATTEMPTS", e))?;
            if attempts == 0 {
                return Err(ConfigError::invalid("HARBOR_MAX_ATTEMPTS", "must be positive"));
            }
            config.max_attempts = attempts;
        }

        if let Some(v) = var("HARBOR_HEALTH_PATH") {
            let path = v.trim().to_string();
            if !path.starts_with('/') {
                return Err(ConfigError::invalid("HARBOR_HEALTH_PATH", "must start with '/'"));
            }
            config.health_path = path;
        }

        Ok(config)
    }

    /// Absolute upstream URL for an origin-relative path.
    pub fn upstream_join(&self, path: &str) -> Result<Url, ConfigError> {
        self.upstream_url
            .join(path)
            .map_err(|e| ConfigError::invalid("HARBOR_UPSTREAM_URL", format!("{path}: {e}")))
    }
}

fn default_generation() -> StorageGeneration {
    StorageGeneration::new(concat!("v", env!("CARGO_PKG_VERSION")))
        .unwrap_or_else(|_| unreachable!("crate version is a valid generation tag"))
}

fn parse_manifest(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<HarborConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarborConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.upstream_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.manifest, vec!["/", "/index.html"]);
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.generation.as_str(), concat!("v", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("HARBOR_UPSTREAM_URL", "https://shop.test"),
            ("HARBOR_GENERATION", "build-42"),
            ("HARBOR_MANIFEST", " /app.js , /index.html,, "),
            ("HARBOR_SYNC_INTERVAL_SECS", "5"),
            ("HARBOR_MAX_ATTEMPTS", "2"),
        ])
        .unwrap();

        assert_eq!(config.upstream_url.host_str(), Some("shop.test"));
        assert_eq!(config.generation.as_str(), "build-42");
        assert_eq!(config.manifest, vec!["/app.js", "/index.html"]);
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = load(&[("HARBOR_MAX_ATTEMPTS", "  ")]).unwrap();
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load(&[("HARBOR_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(err.to_string().contains("HARBOR_MAX_ATTEMPTS"));

        let err = load(&[("HARBOR_UPSTREAM_URL", "ftp://files.test")]).unwrap_err();
        assert!(err.to_string().contains("HARBOR_UPSTREAM_URL"));

        assert!(load(&[("HARBOR_MANIFEST", "app.js")]).is_err());
    }

    #[test]
    fn upstream_join_resolves_paths() {
        let config = load(&[("HARBOR_UPSTREAM_URL", "http://origin.test:9000")]).unwrap();
        assert_eq!(
            config.upstream_join("/index.html").unwrap().as_str(),
            "http://origin.test:9000/index.html"
        );
    }
}
