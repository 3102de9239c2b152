//! HTTP callback server for receiving GENA event notifications.
//!
//! A single server instance receives NOTIFY requests for every
//! subscription the control point holds, validates the GENA headers and
//! routes the raw payload by subscription ID (SID) onto a channel.
//! Notifications carrying an unregistered SID are rejected with
//! 412 Precondition Failed, as GENA requires.

mod error;
pub mod router;
mod server;

pub use error::CallbackError;
pub use router::{EventRouter, NotificationPayload};
pub use server::CallbackServer;
