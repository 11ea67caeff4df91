//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("invalid service key: {0}")]
    InvalidServiceKey(String),

    #[error("unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("unknown mapping status: {0}")]
    UnknownStatus(i64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
