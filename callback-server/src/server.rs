//! HTTP server for receiving GENA event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::CallbackError;
use crate::router::{EventRouter, NotificationPayload};

/// HTTP callback server for receiving GENA NOTIFY requests.
///
/// The server binds to the first free port in a configured range and
/// exposes a single endpoint accepting NOTIFY requests on any path. It
/// validates the GENA headers and routes events through an
/// [`EventRouter`] to a channel.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, NotificationPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///
///     let server = CallbackServer::new((3400, 3500), tx)
///         .await
///         .expect("failed to create callback server");
///
///     println!("listening at {}", server.base_url());
///
///     while let Some(notification) = rx.recv().await {
///         println!("event for subscription {}", notification.subscription_id);
///     }
/// }
/// ```
pub struct CallbackServer {
    /// The port the server is bound to
    port: u16,
    /// The base URL for callback registration
    base_url: String,
    /// Event router for handling incoming events
    event_router: Arc<EventRouter>,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Create and start a new callback server.
    ///
    /// Finds an available port in the given range, detects the local IP
    /// address for callback URLs, and starts the HTTP server. All
    /// subscriptions share this one server; incoming events are routed by
    /// their SID header.
    pub async fn new(
        port_range: (u16, u16),
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, CallbackError> {
        let port = Self::find_available_port(port_range.0, port_range.1).ok_or(
            CallbackError::NoAvailablePort {
                start: port_range.0,
                end: port_range.1,
            },
        )?;

        let local_ip = Self::detect_local_ip().ok_or(CallbackError::NoLocalAddress)?;
        let base_url = format!("http://{local_ip}:{port}");

        let event_router = Arc::new(EventRouter::new(event_sender));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

        let server_handle = Self::start_server(port, event_router.clone(), shutdown_rx, ready_tx);

        // Wait for the server to be ready before handing out the URL
        ready_rx.recv().await.ok_or(CallbackError::StartupFailed)?;

        tracing::info!(%base_url, "callback server listening");

        Ok(Self {
            port,
            base_url,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// The callback URL to hand to devices in SUBSCRIBE requests.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The event router used to register and unregister subscription IDs.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Shut down the callback server gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }

    /// Find an available port in the given range.
    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    /// Check if a port is available for binding.
    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port,
        ))
        .is_ok()
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// Uses a connected UDP socket to determine the address used for
    /// outbound traffic. No data is actually sent.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }

    /// Start the HTTP server on the given port.
    fn start_server(
        port: u16,
        event_router: Arc<EventRouter>,
        mut shutdown_rx: mpsc::Receiver<()>,
        ready_tx: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        use warp::Filter;

        tokio::spawn(async move {
            // NOTIFY endpoint accepting any path; devices echo back the
            // path portion of the callback URL they were given.
            let notify_route = warp::method()
                .and(warp::path::full())
                .and(warp::header::optional::<String>("sid"))
                .and(warp::header::optional::<String>("nt"))
                .and(warp::header::optional::<String>("nts"))
                .and(warp::body::bytes())
                .and_then({
                    let router = event_router.clone();
                    move |method: warp::http::Method,
                          path: warp::path::FullPath,
                          sid: Option<String>,
                          nt: Option<String>,
                          nts: Option<String>,
                          body: bytes::Bytes| {
                        let router = router.clone();
                        async move {
                            if method.as_str() != "NOTIFY" {
                                return Err(warp::reject::not_found());
                            }

                            tracing::debug!(
                                path = path.as_str(),
                                body_len = body.len(),
                                sid = sid.as_deref().unwrap_or("<none>"),
                                "incoming NOTIFY"
                            );

                            if !Self::validate_gena_headers(&sid, &nt, &nts) {
                                tracing::warn!("NOTIFY with invalid GENA headers rejected");
                                return Err(warp::reject::custom(InvalidGenaHeaders));
                            }

                            let sub_id = sid.ok_or_else(|| {
                                warp::reject::custom(InvalidGenaHeaders)
                            })?;

                            let event_xml = String::from_utf8_lossy(&body).to_string();
                            let routed = router.route_event(sub_id, event_xml).await;

                            if routed {
                                Ok::<_, warp::Rejection>(warp::reply::with_status(
                                    "",
                                    warp::http::StatusCode::OK,
                                ))
                            } else {
                                tracing::debug!("NOTIFY for unknown subscription discarded");
                                Err(warp::reject::custom(UnknownSubscription))
                            }
                        }
                    }
                });

            let routes = notify_route.recover(handle_rejection);

            let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port),
                async move {
                    shutdown_rx.recv().await;
                },
            );

            tracing::debug!(%addr, "callback server bound");
            let _ = ready_tx.send(()).await;
            server.await;
        })
    }

    /// Validate GENA event notification headers.
    ///
    /// The SID header is required. NT and NTS, when present, must carry
    /// the values mandated for property-change events.
    fn validate_gena_headers(
        sid: &Option<String>,
        nt: &Option<String>,
        nts: &Option<String>,
    ) -> bool {
        if sid.is_none() {
            return false;
        }

        if let (Some(nt_val), Some(nts_val)) = (nt, nts) {
            if nt_val != "upnp:event" || nts_val != "upnp:propchange" {
                return false;
            }
        }

        true
    }
}

/// Custom rejection for invalid GENA headers.
#[derive(Debug)]
struct InvalidGenaHeaders;

impl warp::reject::Reject for InvalidGenaHeaders {}

/// Custom rejection for notifications carrying an unregistered SID.
#[derive(Debug)]
struct UnknownSubscription;

impl warp::reject::Reject for UnknownSubscription {}

/// Convert rejections to the HTTP responses GENA expects.
async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.find::<UnknownSubscription>().is_some() {
        // 412 per GENA for an invalid or missing SID
        (warp::http::StatusCode::PRECONDITION_FAILED, "Unknown SID")
    } else if err.find::<InvalidGenaHeaders>().is_some() {
        (warp::http::StatusCode::PRECONDITION_FAILED, "Invalid GENA headers")
    } else if err.is_not_found() {
        (warp::http::StatusCode::NOT_FOUND, "Not found")
    } else {
        (
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        )
    };

    Ok(warp::reply::with_status(message, code))
}
