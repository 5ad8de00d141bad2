//! Error types for userflow

use thiserror::Error;

/// Result type alias for userflow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Main error type shared by the pipeline crates
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
