//! Event routing for HTTP callback notifications.
//!
//! The [`EventRouter`] maintains the set of active subscription IDs and
//! routes incoming GENA notifications to a channel. Events for unknown
//! SIDs are dropped.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Generic notification payload for GENA event notifications.
///
/// An unparsed event notification received via HTTP callback: only the
/// subscription ID and the raw XML body, with no device-specific context.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// The subscription ID from the SID header
    pub subscription_id: String,
    /// The raw XML event body
    pub event_xml: String,
}

/// Routes events from HTTP callbacks to a channel.
#[derive(Clone)]
pub struct EventRouter {
    /// Set of active subscription IDs
    subscriptions: Arc<RwLock<HashSet<String>>>,
    /// Channel for sending notification payloads
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    /// Create a new event router sending payloads to `event_sender`.
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            event_sender,
        }
    }

    /// Register a subscription ID for event routing.
    pub async fn register(&self, subscription_id: String) {
        let mut subs = self.subscriptions.write().await;
        subs.insert(subscription_id);
    }

    /// Unregister a subscription ID.
    ///
    /// Future notifications carrying this SID will be rejected.
    pub async fn unregister(&self, subscription_id: &str) {
        let mut subs = self.subscriptions.write().await;
        subs.remove(subscription_id);
    }

    /// Route an incoming event to the channel.
    ///
    /// Returns `true` if the SID was registered and the payload was sent,
    /// `false` if the SID was unknown and the event discarded.
    pub async fn route_event(&self, subscription_id: String, event_xml: String) -> bool {
        let subs = self.subscriptions.read().await;

        if subs.contains(&subscription_id) {
            let payload = NotificationPayload {
                subscription_id,
                event_xml,
            };

            // Ignore send errors if the receiver was dropped
            let _ = self.event_sender.send(payload);
            true
        } else {
            false
        }
    }
}
