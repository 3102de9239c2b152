//! GENA subscription lifecycle.
//!
//! Each subscription gets its own renewal task that wakes a configured
//! margin before the lease expires, renews with bounded exponential
//! backoff, and declares the subscription expired when every attempt
//! fails. Notifications are only deliverable while a subscription is in
//! the `Subscribed` or `Renewing` state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use upnp_description::Service;
use url::Url;

use crate::config::ControlPointConfig;
use crate::engine::ControlPointEvent;
use crate::error::{ControlPointError, Result};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No active subscription
    Unsubscribed,
    /// Initial SUBSCRIBE in flight
    Subscribing,
    /// Active, renewal timer armed
    Subscribed,
    /// Renewal in flight
    Renewing,
}

/// Identifies a subscription by device and service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub udn: String,
    pub service_id: String,
}

/// An established subscription tracked by the manager.
struct ActiveSubscription {
    sid: String,
    state: SubscriptionState,
    cancel_tx: mpsc::Sender<()>,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

/// Manages GENA subscriptions and their renewal tasks.
pub(crate) struct SubscriptionManager {
    client: soap_client::SoapClient,
    router: Arc<callback_server::EventRouter>,
    callback_url: String,
    config: ControlPointConfig,
    subscriptions: Arc<RwLock<HashMap<SubscriptionKey, ActiveSubscription>>>,
    sids: Arc<RwLock<HashMap<String, SubscriptionKey>>>,
    /// In-flight SUBSCRIBE attempts. The watch flips to true when the
    /// attempt finishes, waking callers that arrived in the meantime.
    pending: Arc<RwLock<HashMap<SubscriptionKey, watch::Receiver<bool>>>>,
    event_tx: mpsc::Sender<ControlPointEvent>,
}

impl SubscriptionManager {
    pub fn new(
        router: Arc<callback_server::EventRouter>,
        callback_url: String,
        config: ControlPointConfig,
        event_tx: mpsc::Sender<ControlPointEvent>,
    ) -> Self {
        Self {
            client: soap_client::SoapClient::new(),
            router,
            callback_url,
            config,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            sids: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Subscribe to a service's events.
    ///
    /// Returns the SID. Subscribing to an already-subscribed service is
    /// a no-op that returns the existing SID; a call that arrives while
    /// a SUBSCRIBE for the same service is still in flight waits for
    /// that attempt to finish and shares its outcome.
    pub async fn subscribe(&self, service: &Service) -> Result<String> {
        let key = SubscriptionKey {
            udn: service.device_udn.clone(),
            service_id: service.service_id.clone(),
        };

        let done_tx = loop {
            if let Some(active) = self.subscriptions.read().await.get(&key) {
                return Ok(active.sid.clone());
            }

            let mut waiter = {
                let mut pending = self.pending.write().await;
                match pending.get(&key) {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(false);
                        pending.insert(key.clone(), rx);
                        break tx;
                    }
                }
            };

            // Another SUBSCRIBE for this service is in flight; wait for
            // it and re-check
            if !*waiter.borrow() {
                let _ = waiter.changed().await;
            }
        };

        let client = self.client.clone();
        let event_url = service.event_sub_url.to_string();
        let callback_url = self.callback_url.clone();
        let requested = self.config.subscription_timeout.as_secs() as u32;

        let result = tokio::task::spawn_blocking(move || {
            client.subscribe(&event_url, &callback_url, requested)
        })
        .await;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.finish_pending(&key, &done_tx).await;
                return Err(e.into());
            }
            Err(e) => {
                self.finish_pending(&key, &done_tx).await;
                return Err(ControlPointError::Transport(format!(
                    "subscribe task failed: {e}"
                )));
            }
        };

        let sid = response.sid.clone();
        tracing::info!(
            sid = %sid,
            udn = %key.udn,
            service_id = %key.service_id,
            granted = response.timeout_seconds,
            "subscription established"
        );

        self.router.register(sid.clone()).await;
        self.sids.write().await.insert(sid.clone(), key.clone());

        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let task = self.spawn_renewal(
            key.clone(),
            sid.clone(),
            service.event_sub_url.clone(),
            response.timeout_seconds,
            cancel_rx,
        );

        self.subscriptions.write().await.insert(
            key.clone(),
            ActiveSubscription {
                sid: sid.clone(),
                state: SubscriptionState::Subscribed,
                cancel_tx,
                task,
            },
        );
        self.finish_pending(&key, &done_tx).await;

        let _ = self
            .event_tx
            .send(ControlPointEvent::Subscribed {
                udn: key.udn,
                service_id: key.service_id,
                sid: sid.clone(),
            })
            .await;

        Ok(sid)
    }

    /// Unsubscribe from a service.
    ///
    /// Sends UNSUBSCRIBE to the device; failures are logged since local
    /// cleanup happens regardless. Unknown subscriptions are a no-op.
    pub async fn unsubscribe(&self, key: &SubscriptionKey, event_sub_url: &Url) -> Result<()> {
        let Some(active) = self.subscriptions.write().await.remove(key) else {
            return Ok(());
        };

        let _ = active.cancel_tx.send(()).await;
        self.router.unregister(&active.sid).await;
        self.sids.write().await.remove(&active.sid);

        let client = self.client.clone();
        let event_url = event_sub_url.to_string();
        let sid = active.sid.clone();
        let result =
            tokio::task::spawn_blocking(move || client.unsubscribe(&event_url, &sid)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(sid = %active.sid, error = %e, "UNSUBSCRIBE failed")
            }
            Err(e) => tracing::warn!(error = %e, "unsubscribe task failed"),
        }

        let _ = self
            .event_tx
            .send(ControlPointEvent::Unsubscribed {
                udn: key.udn.clone(),
                service_id: key.service_id.clone(),
            })
            .await;

        Ok(())
    }

    /// Drop every subscription belonging to a device that disappeared.
    ///
    /// No UNSUBSCRIBE is sent; the device is unreachable.
    pub async fn cancel_for_device(&self, udn: &str) {
        let keys: Vec<SubscriptionKey> = {
            let subs = self.subscriptions.read().await;
            subs.keys().filter(|k| k.udn == udn).cloned().collect()
        };

        for key in keys {
            if let Some(active) = self.subscriptions.write().await.remove(&key) {
                let _ = active.cancel_tx.send(()).await;
                self.router.unregister(&active.sid).await;
                self.sids.write().await.remove(&active.sid);

                let _ = self
                    .event_tx
                    .send(ControlPointEvent::Unsubscribed {
                        udn: key.udn,
                        service_id: key.service_id,
                    })
                    .await;
            }
        }
    }

    /// Whether events for a SID should be delivered, and to which
    /// subscription.
    ///
    /// Returns None for unknown SIDs and for subscriptions that are not
    /// in the `Subscribed` or `Renewing` state.
    pub async fn deliverable(&self, sid: &str) -> Option<SubscriptionKey> {
        let key = self.sids.read().await.get(sid).cloned()?;
        let subs = self.subscriptions.read().await;
        let active = subs.get(&key)?;
        match active.state {
            SubscriptionState::Subscribed | SubscriptionState::Renewing => Some(key),
            SubscriptionState::Unsubscribed | SubscriptionState::Subscribing => None,
        }
    }

    /// Current state of a subscription.
    pub async fn state(&self, key: &SubscriptionKey) -> SubscriptionState {
        if let Some(active) = self.subscriptions.read().await.get(key) {
            return active.state;
        }
        if self.pending.read().await.contains_key(key) {
            return SubscriptionState::Subscribing;
        }
        SubscriptionState::Unsubscribed
    }

    /// Tear down all subscriptions, sending UNSUBSCRIBE best-effort.
    pub async fn shutdown_all(&self, event_urls: &HashMap<SubscriptionKey, Url>) {
        let keys: Vec<SubscriptionKey> = {
            let subs = self.subscriptions.read().await;
            subs.keys().cloned().collect()
        };

        for key in keys {
            if let Some(url) = event_urls.get(&key) {
                if let Err(e) = self.unsubscribe(&key, url).await {
                    tracing::warn!(
                        udn = %key.udn,
                        service_id = %key.service_id,
                        error = %e,
                        "unsubscribe during shutdown failed"
                    );
                }
            } else if let Some(active) = self.subscriptions.write().await.remove(&key) {
                let _ = active.cancel_tx.send(()).await;
                self.router.unregister(&active.sid).await;
                self.sids.write().await.remove(&active.sid);
            }
        }
    }

    /// Drop the pending entry for a finished SUBSCRIBE attempt and wake
    /// any callers waiting on it.
    async fn finish_pending(&self, key: &SubscriptionKey, done_tx: &watch::Sender<bool>) {
        self.pending.write().await.remove(key);
        let _ = done_tx.send(true);
    }

    fn spawn_renewal(
        &self,
        key: SubscriptionKey,
        sid: String,
        event_sub_url: Url,
        granted_seconds: u32,
        mut cancel_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let router = self.router.clone();
        let subscriptions = self.subscriptions.clone();
        let sids = self.sids.clone();
        let event_tx = self.event_tx.clone();
        let margin = self.config.renewal_margin;
        let requested = self.config.subscription_timeout.as_secs() as u32;
        let max_attempts = self.config.max_retry_attempts.max(1);
        let backoff_base = self.config.retry_backoff_base;

        tokio::spawn(async move {
            let mut granted = granted_seconds;

            loop {
                let lease = Duration::from_secs(granted as u64);
                let wait = lease.saturating_sub(margin);
                // A lease shorter than the margin still renews, at half-life
                let wait = if wait.is_zero() { lease / 2 } else { wait };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel_rx.recv() => return,
                }

                set_state(&subscriptions, &key, SubscriptionState::Renewing).await;

                let mut attempt = 0u32;
                let renewed = loop {
                    attempt += 1;

                    let client = client.clone();
                    let url = event_sub_url.to_string();
                    let renew_sid = sid.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        client.renew_subscription(&url, &renew_sid, requested)
                    })
                    .await;

                    match result {
                        Ok(Ok(timeout)) => break Some(timeout),
                        Ok(Err(e)) => {
                            tracing::warn!(sid = %sid, attempt, error = %e, "renewal failed")
                        }
                        Err(e) => {
                            tracing::warn!(sid = %sid, attempt, error = %e, "renewal task failed")
                        }
                    }

                    if attempt >= max_attempts {
                        break None;
                    }

                    let backoff = backoff_base * 2u32.pow(attempt - 1);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel_rx.recv() => return,
                    }
                };

                match renewed {
                    Some(timeout) => {
                        granted = timeout;
                        set_state(&subscriptions, &key, SubscriptionState::Subscribed).await;
                        tracing::debug!(sid = %sid, granted, "subscription renewed");
                        let _ = event_tx
                            .send(ControlPointEvent::SubscriptionRenewed {
                                udn: key.udn.clone(),
                                service_id: key.service_id.clone(),
                                sid: sid.clone(),
                            })
                            .await;
                    }
                    None => {
                        let err = ControlPointError::SubscriptionExpired(format!(
                            "{} on {}",
                            key.service_id, key.udn
                        ));
                        tracing::warn!(sid = %sid, error = %err, "renewals exhausted");
                        subscriptions.write().await.remove(&key);
                        sids.write().await.remove(&sid);
                        router.unregister(&sid).await;
                        let _ = event_tx
                            .send(ControlPointEvent::SubscriptionExpired {
                                udn: key.udn.clone(),
                                service_id: key.service_id.clone(),
                            })
                            .await;
                        return;
                    }
                }
            }
        })
    }
}

async fn set_state(
    subscriptions: &Arc<RwLock<HashMap<SubscriptionKey, ActiveSubscription>>>,
    key: &SubscriptionKey,
    state: SubscriptionState,
) {
    if let Some(active) = subscriptions.write().await.get_mut(key) {
        active.state = state;
    }
}
