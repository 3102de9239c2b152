//! Error types for the callback server.

use thiserror::Error;

/// Errors that can occur while running the callback server.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// No free port was found in the configured range
    #[error("No available port found in range {start}-{end}")]
    NoAvailablePort {
        /// First port tried
        start: u16,
        /// Last port tried
        end: u16,
    },

    /// The local IP address for callback URLs could not be determined
    #[error("Failed to detect local IP address")]
    NoLocalAddress,

    /// The HTTP server failed to start
    #[error("Server failed to start")]
    StartupFailed,
}
