//! SSDP-based discovery engine for UPnP devices.
//!
//! This crate implements the discovery half of a UPnP control point:
//! it multicasts M-SEARCH requests for a configured target, listens for
//! search responses and unsolicited `ssdp:alive`/`ssdp:byebye`
//! notifications, and tracks known devices by UDN with expiry derived
//! from each advertisement's `CACHE-CONTROL: max-age`.
//!
//! Consumers receive [`DiscoveryEvent`]s on a channel:
//!
//! ```no_run
//! use upnp_discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (engine, mut events) = DiscoveryEngine::start(DiscoveryConfig::default())
//!         .await
//!         .expect("failed to start discovery");
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             DiscoveryEvent::Alive { udn, location, .. } => {
//!                 println!("device {udn} at {location}");
//!             }
//!             DiscoveryEvent::Gone { udn } => println!("device {udn} gone"),
//!         }
//!     }
//!
//!     engine.shutdown().await.unwrap();
//! }
//! ```

mod engine;
mod error;
mod registry;
mod ssdp;

pub use engine::{DiscoveryConfig, DiscoveryEngine, DiscoveryEvent};
pub use error::{DiscoveryError, Result};
pub use registry::{DeviceRecord, DeviceRegistry, Observed};
pub use ssdp::{Advertisement, SsdpMessage};
