//! Error types for the discovery engine.

use thiserror::Error;

/// Errors that can occur during device discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket or multicast setup failure
    #[error("Network error: {0}")]
    Network(String),

    /// The engine's background task failed to stop in time
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
