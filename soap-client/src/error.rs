//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP or GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// Structured UPnP fault returned by the remote peer
    #[error("UPnP fault {code}: {description}")]
    Fault {
        /// UPnP error code (e.g. 401 Invalid Action, 402 Invalid Args)
        code: u16,
        /// Human-readable error description from the fault body
        description: String,
    },
}
