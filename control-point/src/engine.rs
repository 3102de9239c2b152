//! The control point engine.
//!
//! Wires discovery, description caching, action invocation and GENA
//! eventing behind one handle. A single event loop serializes device
//! arrivals, departures and incoming notifications into one ordered
//! stream of [`ControlPointEvent`]s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use callback_server::{CallbackServer, NotificationPayload};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use upnp_description::{DescriptionCache, Device, Service, Value};
use upnp_discovery::{DiscoveryEngine, DiscoveryEvent};

use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result};
use crate::events::{parse_last_change, parse_property_set, LastChangeEntry, PropertyChange};
use crate::invoker::ActionInvoker;
use crate::subscription::{SubscriptionKey, SubscriptionManager, SubscriptionState};

/// Events emitted by a running [`ControlPoint`].
#[derive(Debug, Clone)]
pub enum ControlPointEvent {
    /// A device was discovered and its description resolved
    DeviceAppeared(Arc<Device>),
    /// A known device said goodbye or its advertisement expired
    DeviceDisappeared {
        udn: String,
    },
    /// A GENA subscription was established
    Subscribed {
        udn: String,
        service_id: String,
        sid: String,
    },
    /// A subscription lease was renewed
    SubscriptionRenewed {
        udn: String,
        service_id: String,
        sid: String,
    },
    /// All renewal attempts failed and the subscription lapsed
    SubscriptionExpired {
        udn: String,
        service_id: String,
    },
    /// A subscription was cancelled
    Unsubscribed {
        udn: String,
        service_id: String,
    },
    /// A NOTIFY delivered changed state variables
    PropertiesChanged {
        udn: String,
        service_id: String,
        changes: Vec<PropertyChange>,
    },
    /// Decoded per-instance changes from a `LastChange` variable
    LastChange {
        udn: String,
        service_id: String,
        entries: Vec<LastChangeEntry>,
    },
}

/// A running UPnP control point.
///
/// Created with [`ControlPoint::start`], which returns the handle
/// together with the event receiver.
///
/// # Example
///
/// ```no_run
/// use upnp_point::{ControlPoint, ControlPointConfig, ControlPointEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (point, mut events) = ControlPoint::start(ControlPointConfig::default()).await?;
///
///     while let Some(event) = events.recv().await {
///         if let ControlPointEvent::DeviceAppeared(device) = event {
///             println!("found {} ({})", device.friendly_name, device.udn);
///         }
///     }
///
///     point.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct ControlPoint {
    devices: Arc<RwLock<HashMap<String, Arc<Device>>>>,
    locations: Arc<RwLock<HashMap<String, String>>>,
    cache: Arc<DescriptionCache>,
    manager: Arc<SubscriptionManager>,
    invoker: ActionInvoker,
    discovery: DiscoveryEngine,
    callback: CallbackServer,
    shutdown_tx: mpsc::Sender<()>,
    loop_handle: JoinHandle<()>,
}

impl ControlPoint {
    /// Start the control point: callback server, SSDP discovery and the
    /// event loop.
    pub async fn start(
        config: ControlPointConfig,
    ) -> Result<(Self, mpsc::Receiver<ControlPointEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer_size);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let callback = CallbackServer::new(config.callback_port_range, notify_tx).await?;
        let cache = Arc::new(DescriptionCache::new(config.cache.clone())?);
        let (discovery, discovery_rx) = DiscoveryEngine::start(config.discovery.clone()).await?;

        let manager = Arc::new(SubscriptionManager::new(
            callback.router().clone(),
            callback.base_url().to_string(),
            config.clone(),
            event_tx.clone(),
        ));

        let devices: Arc<RwLock<HashMap<String, Arc<Device>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let locations: Arc<RwLock<HashMap<String, String>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let event_loop = EventLoop {
            devices: devices.clone(),
            locations: locations.clone(),
            cache: cache.clone(),
            manager: manager.clone(),
            event_tx,
            resolving: HashSet::new(),
        };
        let loop_handle = tokio::spawn(event_loop.run(discovery_rx, notify_rx, shutdown_rx));

        tracing::info!("control point started");

        Ok((
            Self {
                devices,
                locations,
                cache,
                manager,
                invoker: ActionInvoker::new(),
                discovery,
                callback,
                shutdown_tx,
                loop_handle,
            },
            event_rx,
        ))
    }

    /// Snapshot of all resolved devices.
    pub async fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().await.values().cloned().collect()
    }

    /// The resolved device with the given UDN, if known.
    pub async fn device(&self, udn: &str) -> Option<Arc<Device>> {
        self.devices.read().await.get(udn).cloned()
    }

    /// Find a service by type on a known device.
    pub async fn find_service(&self, udn: &str, service_type: &str) -> Result<Service> {
        let device = self
            .device(udn)
            .await
            .ok_or_else(|| ControlPointError::NotFound(format!("no device {udn}")))?;
        device
            .find_service(service_type)
            .cloned()
            .ok_or_else(|| {
                ControlPointError::NotFound(format!("device {udn} has no service {service_type}"))
            })
    }

    /// Invoke an action on a device's service.
    ///
    /// Arguments are validated against the service's schema before any
    /// network traffic; out-arguments are returned typed, in declared
    /// order.
    pub async fn invoke(
        &self,
        udn: &str,
        service_type: &str,
        action: &str,
        args: &[(String, Value)],
    ) -> Result<Vec<(String, Value)>> {
        let service = self.find_service(udn, service_type).await?;
        self.invoker.invoke(&service, action, args).await
    }

    /// Subscribe to a service's events. Returns the SID.
    pub async fn subscribe(&self, udn: &str, service_type: &str) -> Result<String> {
        let service = self.find_service(udn, service_type).await?;
        self.manager.subscribe(&service).await
    }

    /// Cancel a subscription.
    pub async fn unsubscribe(&self, udn: &str, service_type: &str) -> Result<()> {
        let service = self.find_service(udn, service_type).await?;
        let key = SubscriptionKey {
            udn: service.device_udn.clone(),
            service_id: service.service_id.clone(),
        };
        self.manager.unsubscribe(&key, &service.event_sub_url).await
    }

    /// Current subscription state for a device's service.
    pub async fn subscription_state(
        &self,
        udn: &str,
        service_type: &str,
    ) -> Result<SubscriptionState> {
        let service = self.find_service(udn, service_type).await?;
        let key = SubscriptionKey {
            udn: service.device_udn.clone(),
            service_id: service.service_id.clone(),
        };
        Ok(self.manager.state(&key).await)
    }

    /// Shut down the control point: unsubscribe everything, stop the
    /// event loop, the callback server and discovery.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("shutting down control point");

        let event_urls: HashMap<SubscriptionKey, url::Url> = {
            let devices = self.devices.read().await;
            devices
                .values()
                .flat_map(|device| device.all_services())
                .map(|service| {
                    (
                        SubscriptionKey {
                            udn: service.device_udn.clone(),
                            service_id: service.service_id.clone(),
                        },
                        service.event_sub_url.clone(),
                    )
                })
                .collect()
        };
        self.manager.shutdown_all(&event_urls).await;

        let _ = self.shutdown_tx.send(()).await;
        tokio::time::timeout(Duration::from_secs(5), self.loop_handle)
            .await
            .map_err(|_| ControlPointError::Shutdown("event loop did not stop in time".into()))?
            .map_err(|e| ControlPointError::Shutdown(format!("event loop panicked: {e}")))?;

        self.callback.shutdown().await;
        self.discovery.shutdown().await?;

        Ok(())
    }
}

/// Message from a background description fetch back to the loop.
///
/// `device` is None when the fetch or parse failed; the loop still needs
/// the message to clear its in-flight bookkeeping.
struct Resolved {
    udn: String,
    location: String,
    device: Option<Arc<Device>>,
}

struct EventLoop {
    devices: Arc<RwLock<HashMap<String, Arc<Device>>>>,
    locations: Arc<RwLock<HashMap<String, String>>>,
    cache: Arc<DescriptionCache>,
    manager: Arc<SubscriptionManager>,
    event_tx: mpsc::Sender<ControlPointEvent>,
    /// UDNs with a description fetch in flight. A device that says
    /// goodbye while resolving is dropped here so the late result is
    /// discarded instead of resurrecting it.
    resolving: HashSet<String>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut discovery_rx: mpsc::Receiver<DiscoveryEvent>,
        mut notify_rx: mpsc::UnboundedReceiver<NotificationPayload>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        // Keep a sender alive so the resolved channel never closes
        let (resolved_tx, mut resolved_rx) = mpsc::channel::<Resolved>(16);

        loop {
            tokio::select! {
                maybe_event = discovery_rx.recv() => {
                    match maybe_event {
                        Some(DiscoveryEvent::Alive { udn, location, .. }) => {
                            self.handle_alive(udn, location, resolved_tx.clone()).await;
                        }
                        Some(DiscoveryEvent::Gone { udn }) => {
                            self.handle_gone(&udn).await;
                        }
                        None => {
                            tracing::debug!("discovery channel closed, stopping event loop");
                            break;
                        }
                    }
                }
                Some(resolved) = resolved_rx.recv() => {
                    self.handle_resolved(resolved).await;
                }
                Some(notification) = notify_rx.recv() => {
                    self.handle_notification(notification).await;
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("event loop received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Resolve a newly advertised device in the background.
    async fn handle_alive(
        &mut self,
        udn: String,
        location: String,
        resolved_tx: mpsc::Sender<Resolved>,
    ) {
        if self.devices.read().await.contains_key(&udn) || self.resolving.contains(&udn) {
            return;
        }
        self.resolving.insert(udn.clone());

        let cache = self.cache.clone();
        tokio::spawn(async move {
            let device = match cache.device(&location).await {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!(%udn, %location, error = %e, "description fetch failed");
                    None
                }
            };
            let _ = resolved_tx
                .send(Resolved {
                    udn,
                    location,
                    device,
                })
                .await;
        });
    }

    async fn handle_resolved(&mut self, resolved: Resolved) {
        if !self.resolving.remove(&resolved.udn) {
            // The device said goodbye while its description was in flight
            tracing::debug!(udn = %resolved.udn, "discarding description for a departed device");
            return;
        }

        let Some(device) = resolved.device else {
            return;
        };

        self.devices
            .write()
            .await
            .insert(resolved.udn.clone(), device.clone());
        self.locations
            .write()
            .await
            .insert(resolved.udn, resolved.location);

        let _ = self
            .event_tx
            .send(ControlPointEvent::DeviceAppeared(device))
            .await;
    }

    async fn handle_gone(&mut self, udn: &str) {
        self.resolving.remove(udn);
        let removed = self.devices.write().await.remove(udn);

        if let Some(location) = self.locations.write().await.remove(udn) {
            // A reappearance must fetch a fresh description
            self.cache.invalidate(&location).await;
        }

        self.manager.cancel_for_device(udn).await;

        if removed.is_some() {
            let _ = self
                .event_tx
                .send(ControlPointEvent::DeviceDisappeared {
                    udn: udn.to_string(),
                })
                .await;
        }
    }

    async fn handle_notification(&self, notification: NotificationPayload) {
        let Some(key) = self.manager.deliverable(&notification.subscription_id).await else {
            tracing::debug!(
                sid = %notification.subscription_id,
                "notification for inactive subscription discarded"
            );
            return;
        };

        let changes = match parse_property_set(&notification.event_xml) {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!(sid = %notification.subscription_id, error = %e, "bad NOTIFY body");
                return;
            }
        };

        let last_change = changes
            .iter()
            .find(|c| c.variable == "LastChange")
            .map(|c| c.value.clone());

        let _ = self
            .event_tx
            .send(ControlPointEvent::PropertiesChanged {
                udn: key.udn.clone(),
                service_id: key.service_id.clone(),
                changes,
            })
            .await;

        if let Some(xml) = last_change {
            match parse_last_change(&xml) {
                Ok(entries) if !entries.is_empty() => {
                    let _ = self
                        .event_tx
                        .send(ControlPointEvent::LastChange {
                            udn: key.udn,
                            service_id: key.service_id,
                            entries,
                        })
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(udn = %key.udn, error = %e, "undecodable LastChange value");
                }
            }
        }
    }
}
