//! The discovery engine background task.
//!
//! Owns the SSDP sockets and the device registry. A single task drives
//! periodic M-SEARCH requests, the multicast NOTIFY listener, and the
//! expiry sweep, and emits [`DiscoveryEvent`]s on an mpsc channel so
//! consumers never touch live mutable state.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};

use crate::error::{DiscoveryError, Result};
use crate::registry::{DeviceRecord, DeviceRegistry, Observed};
use crate::ssdp::{self, SsdpMessage, SSDP_MULTICAST_ADDR};

/// Configuration for the discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Search target sent in M-SEARCH requests and used to filter events
    pub search_target: String,
    /// Interval between M-SEARCH requests
    pub search_interval: Duration,
    /// MX value (maximum response delay) advertised in searches
    pub mx: u32,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
    /// Size of the event channel buffer
    pub event_buffer_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_target: "upnp:rootdevice".to_string(),
            search_interval: Duration::from_secs(60),
            mx: 2,
            sweep_interval: Duration::from_secs(10),
            event_buffer_size: 100,
        }
    }
}

/// Events emitted by the discovery engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A device matching the search target appeared on the network
    Alive {
        /// Unique Device Name
        udn: String,
        /// Advertised notification type
        notification_type: String,
        /// URL of the device description document
        location: String,
        /// Advertised validity window
        max_age: Duration,
    },
    /// A known device expired or said goodbye
    Gone {
        /// UDN of the removed device
        udn: String,
    },
}

/// SSDP discovery engine.
///
/// Created with [`DiscoveryEngine::start`], which returns the engine
/// handle together with the event receiver. The engine keeps running
/// until [`DiscoveryEngine::shutdown`] is called.
pub struct DiscoveryEngine {
    registry: Arc<RwLock<DeviceRegistry>>,
    background_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl DiscoveryEngine {
    /// Start the discovery engine.
    ///
    /// Binds an ephemeral socket for M-SEARCH responses and attempts to
    /// bind the SSDP multicast port for unsolicited notifications. If the
    /// multicast port is unavailable the engine still runs in search-only
    /// mode; byebye and alive notifications are then picked up on the next
    /// search cycle or expiry sweep.
    pub async fn start(config: DiscoveryConfig) -> Result<(Self, mpsc::Receiver<DiscoveryEvent>)> {
        let search_socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| DiscoveryError::Network(format!("failed to bind search socket: {e}")))?;

        let notify_socket = match Self::bind_notify_socket().await {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!("multicast listener unavailable, running search-only: {e}");
                None
            }
        };

        let (event_tx, event_rx) = mpsc::channel(config.event_buffer_size);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let registry = Arc::new(RwLock::new(DeviceRegistry::new()));

        let background_task = tokio::spawn(Self::discovery_task(
            config,
            search_socket,
            notify_socket,
            registry.clone(),
            event_tx,
            shutdown_rx,
        ));

        Ok((
            Self {
                registry,
                background_task: Some(background_task),
                shutdown_tx: Some(shutdown_tx),
            },
            event_rx,
        ))
    }

    /// Immutable snapshot of the devices currently known to the engine.
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.read().await.snapshot()
    }

    /// Stop the engine.
    ///
    /// Signals the background task and waits up to 5 seconds for it to
    /// finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        if let Some(task) = self.background_task.take() {
            match timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(DiscoveryError::Shutdown(format!("discovery task panicked: {e}"))),
                Err(_) => Err(DiscoveryError::Shutdown(
                    "discovery task shutdown timed out after 5 seconds".to_string(),
                )),
            }
        } else {
            Ok(())
        }
    }

    async fn bind_notify_socket() -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind("0.0.0.0:1900").await?;
        socket.join_multicast_v4(Ipv4Addr::new(239, 255, 255, 250), Ipv4Addr::UNSPECIFIED)?;
        Ok(socket)
    }

    async fn discovery_task(
        config: DiscoveryConfig,
        search_socket: UdpSocket,
        notify_socket: Option<UdpSocket>,
        registry: Arc<RwLock<DeviceRegistry>>,
        event_tx: mpsc::Sender<DiscoveryEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut search_tick = interval(config.search_interval);
        let mut sweep_tick = interval(config.sweep_interval);
        let mut search_buf = [0u8; 2048];
        let mut notify_buf = [0u8; 2048];

        loop {
            tokio::select! {
                _ = search_tick.tick() => {
                    let request = ssdp::build_search(&config.search_target, config.mx);
                    if let Err(e) = search_socket.send_to(request.as_bytes(), SSDP_MULTICAST_ADDR).await {
                        tracing::warn!("failed to send M-SEARCH: {e}");
                    }
                }
                _ = sweep_tick.tick() => {
                    Self::sweep(&registry, &event_tx).await;
                }
                received = search_socket.recv_from(&mut search_buf) => {
                    if let Ok((size, _)) = received {
                        Self::handle_datagram(&search_buf[..size], &config, &registry, &event_tx).await;
                    }
                }
                received = Self::recv_on(notify_socket.as_ref(), &mut notify_buf) => {
                    if let Ok((size, _)) = received {
                        Self::handle_datagram(&notify_buf[..size], &config, &registry, &event_tx).await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    }

    /// Receive on the notify socket, or park forever when it is absent.
    async fn recv_on(
        socket: Option<&UdpSocket>,
        buf: &mut [u8],
    ) -> std::io::Result<(usize, std::net::SocketAddr)> {
        match socket {
            Some(socket) => socket.recv_from(buf).await,
            None => std::future::pending().await,
        }
    }

    async fn handle_datagram(
        datagram: &[u8],
        config: &DiscoveryConfig,
        registry: &Arc<RwLock<DeviceRegistry>>,
        event_tx: &mpsc::Sender<DiscoveryEvent>,
    ) {
        let Ok(text) = std::str::from_utf8(datagram) else {
            return;
        };
        let Some(message) = ssdp::parse_message(text) else {
            return;
        };

        match message {
            SsdpMessage::Alive(advertisement) => {
                if !Self::matches_target(&config.search_target, &advertisement.notification_type) {
                    return;
                }

                let observed = {
                    let mut registry = registry.write().await;
                    registry.observe(&advertisement, Instant::now())
                };

                match observed {
                    Observed::New => {
                        tracing::debug!(udn = %advertisement.udn, location = %advertisement.location, "device appeared");
                        let _ = event_tx
                            .send(DiscoveryEvent::Alive {
                                udn: advertisement.udn,
                                notification_type: advertisement.notification_type,
                                location: advertisement.location,
                                max_age: advertisement.max_age,
                            })
                            .await;
                    }
                    Observed::Refreshed => {
                        tracing::trace!(udn = %advertisement.udn, "advertisement refreshed");
                    }
                }
            }
            SsdpMessage::ByeBye { udn, .. } => {
                let removed = {
                    let mut registry = registry.write().await;
                    registry.remove(&udn)
                };
                if removed.is_some() {
                    tracing::debug!(udn = %udn, "device said goodbye");
                    let _ = event_tx.send(DiscoveryEvent::Gone { udn }).await;
                }
            }
        }
    }

    async fn sweep(registry: &Arc<RwLock<DeviceRegistry>>, event_tx: &mpsc::Sender<DiscoveryEvent>) {
        let removed = {
            let mut registry = registry.write().await;
            registry.sweep(Instant::now())
        };

        for record in removed {
            tracing::debug!(udn = %record.udn, "device advertisement expired");
            let _ = event_tx.send(DiscoveryEvent::Gone { udn: record.udn }).await;
        }
    }

    /// Whether an advertisement's type matches the configured search target.
    fn matches_target(target: &str, notification_type: &str) -> bool {
        target == "ssdp:all" || target == notification_type
    }
}
