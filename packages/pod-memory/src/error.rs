use sylph_core::CoreError;
use thiserror::Error;

/// Data-layer error types
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("UUID parse error: {0}")]
    UuidParse(#[from] uuid::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for data-layer operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Map data-layer failures onto the pipeline taxonomy: connection and
/// query failures are retry-worthy, shape problems are not.
impl From<MemoryError> for CoreError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Database(e) => CoreError::Transient(format!("relational store: {}", e)),
            MemoryError::Http(e) if e.is_timeout() => {
                CoreError::Timeout(format!("store request: {}", e))
            }
            MemoryError::Http(e) => CoreError::Transient(format!("store request: {}", e)),
            MemoryError::Connection(msg) => CoreError::Transient(msg),
            MemoryError::NotFound(what) => CoreError::NotFound(what),
            MemoryError::Serialization(e) => CoreError::Invalid(format!("payload: {}", e)),
            MemoryError::UuidParse(e) => CoreError::Invalid(format!("point id: {}", e)),
            MemoryError::InvalidData(msg) => CoreError::Invalid(msg),
            MemoryError::Internal(msg) => CoreError::Fatal(msg),
        }
    }
}
