//! Core error model.

use thiserror::Error;

/// Result type used by the pure building blocks.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while constructing or parsing core values.
///
/// Keep this focused on deterministic input failures. Storage and network
/// concerns have their own error types in `harbor-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A storage generation tag was empty or malformed.
    #[error("invalid storage generation: {0}")]
    InvalidGeneration(String),

    /// A URL could not be parsed or resolved against the origin.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A route table entry was malformed.
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn invalid_route(msg: impl Into<String>) -> Self {
        Self::InvalidRoute(msg.into())
    }
}
