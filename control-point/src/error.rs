//! Unified error type for the control point.

use thiserror::Error;
use upnp_description::{DescriptionError, ValueError};
use upnp_discovery::DiscoveryError;

/// Errors surfaced by control point operations.
#[derive(Debug, Error)]
pub enum ControlPointError {
    /// Network failure while talking to a device
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed document or response from a device
    #[error("Parse error: {0}")]
    Parse(String),

    /// The device rejected an action with a UPnP error
    #[error("UPnP fault {code}: {description}")]
    ProtocolFault {
        /// UPnP error code, e.g. 401 Invalid Action
        code: u16,
        /// Device-supplied description
        description: String,
    },

    /// The invocation does not match the service's declared schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A subscription lapsed and could not be renewed.
    ///
    /// Expiry is detected by the renewal task, not by a caller, so it is
    /// reported on the event stream as
    /// [`ControlPointEvent::SubscriptionExpired`](crate::ControlPointEvent::SubscriptionExpired)
    /// rather than returned from an operation.
    #[error("Subscription expired: {0}")]
    SubscriptionExpired(String),

    /// No device or service matches the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// The engine is shutting down or already stopped
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Convenience Result type alias for control point operations.
pub type Result<T> = std::result::Result<T, ControlPointError>;

impl From<DiscoveryError> for ControlPointError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::Network(msg) => ControlPointError::Transport(msg),
            DiscoveryError::Shutdown(msg) => ControlPointError::Shutdown(msg),
        }
    }
}

impl From<DescriptionError> for ControlPointError {
    fn from(e: DescriptionError) -> Self {
        match e {
            DescriptionError::Transport(msg) => ControlPointError::Transport(msg),
            DescriptionError::Parse(msg) => ControlPointError::Parse(msg),
        }
    }
}

impl From<soap_client::SoapError> for ControlPointError {
    fn from(e: soap_client::SoapError) -> Self {
        match e {
            soap_client::SoapError::Network(msg) => ControlPointError::Transport(msg),
            soap_client::SoapError::Parse(msg) => ControlPointError::Parse(msg),
            soap_client::SoapError::Fault { code, description } => {
                ControlPointError::ProtocolFault { code, description }
            }
        }
    }
}

impl From<callback_server::CallbackError> for ControlPointError {
    fn from(e: callback_server::CallbackError) -> Self {
        ControlPointError::Transport(e.to_string())
    }
}

impl From<ValueError> for ControlPointError {
    fn from(e: ValueError) -> Self {
        ControlPointError::SchemaMismatch(e.to_string())
    }
}
