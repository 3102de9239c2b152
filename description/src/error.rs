//! Error types for description retrieval and parsing.

use thiserror::Error;

/// Errors that can occur while fetching or parsing descriptions.
#[derive(Debug, Error)]
pub enum DescriptionError {
    /// HTTP transport failure (timeout, connection refused, bad status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed description or SCPD document
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience Result type alias for description operations.
pub type Result<T> = std::result::Result<T, DescriptionError>;
