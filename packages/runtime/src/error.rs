//! Error types for the runtime crate

use thiserror::Error;

/// Main error type for the runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Required configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model provider failure that survived its retry budget
    #[error("Model provider error: {0}")]
    Provider(String),

    /// Prompt could not be fit to budget even after truncation
    #[error("Assembly error: {0}")]
    Assembly(String),

    /// Pipeline-internal invariant violation
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Errors bubbled from shared components
    #[error(transparent)]
    Core(#[from] sylph_core::CoreError),
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
