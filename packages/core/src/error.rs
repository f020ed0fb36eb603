//! Error types shared across the pipeline

use thiserror::Error;

/// Main error type for pipeline components.
///
/// Variants map onto the failure classes the orchestrator distinguishes:
/// transient failures are retried where a retry budget exists, degraded
/// results continue with empty slots, invalid input produces a canned
/// response, and fatal errors abort the turn.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store or model timeout / rate limit; retryable
    #[error("transient failure: {0}")]
    Transient(String),

    /// A store returned empty or partial data
    #[error("degraded data: {0}")]
    Degraded(String),

    /// Security rejection or schema violation in an external return
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Deadline exceeded
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Lookup miss where a record was required
    #[error("{0} not found")]
    NotFound(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Orchestrator bug or missing required configuration
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether a retry inside the same phase is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::Timeout(_))
    }
}

/// Convert string errors to CoreError
impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Fatal(s)
    }
}

/// Convert &str errors to CoreError
impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Fatal(s.to_string())
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CoreError>;
