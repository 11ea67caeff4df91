//! Tag store error types.

use thiserror::Error;

/// Tag store operation errors.
///
/// Every error aborts the enclosing transaction; logical no-ops are not
/// errors and never surface here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] tagbase_core::Error),

    /// An update or query addressed a service that cannot accept it.
    #[error("invalid service: {0}")]
    InvalidService(String),

    #[error("invalid precedence order: {0}")]
    InvalidPrecedence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The writer task has stopped and can no longer accept work.
    #[error("writer queue closed")]
    QueueClosed,
}

/// Result type for tag store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("id list encoding failed: {err}"))
    }
}
