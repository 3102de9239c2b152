//! A UPnP control point engine.
//!
//! `upnp-point` discovers devices over SSDP, fetches and caches their
//! descriptions, invokes SOAP actions validated against each service's
//! declared schema, and keeps GENA event subscriptions alive with
//! automatic renewal. Everything a running control point observes is
//! delivered as one ordered stream of [`ControlPointEvent`]s.
//!
//! # Quick start
//!
//! ```no_run
//! use upnp_point::{ControlPoint, ControlPointConfig, ControlPointEvent, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (point, mut events) = ControlPoint::start(ControlPointConfig::default()).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ControlPointEvent::DeviceAppeared(device) => {
//!                 println!("found {}", device.friendly_name);
//!
//!                 let rc = "urn:schemas-upnp-org:service:RenderingControl:1";
//!                 if device.find_service(rc).is_some() {
//!                     let outs = point
//!                         .invoke(
//!                             &device.udn,
//!                             rc,
//!                             "GetVolume",
//!                             &[
//!                                 ("InstanceID".to_string(), Value::from(0u32)),
//!                                 ("Channel".to_string(), Value::from("Master")),
//!                             ],
//!                         )
//!                         .await?;
//!                     println!("volume: {:?}", outs);
//!                 }
//!             }
//!             ControlPointEvent::DeviceDisappeared { udn } => {
//!                 println!("lost {udn}");
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     point.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod events;
mod invoker;
mod subscription;

pub use config::ControlPointConfig;
pub use engine::{ControlPoint, ControlPointEvent};
pub use error::{ControlPointError, Result};
pub use events::{parse_last_change, parse_property_set, LastChangeEntry, PropertyChange};
pub use invoker::ActionInvoker;
pub use subscription::{SubscriptionKey, SubscriptionState};

pub use upnp_description::{
    Action, AllowedRange, Argument, CacheConfig, DataType, Device, Direction, Scpd, Service,
    StateVariable, Value,
};
pub use upnp_discovery::{DiscoveryConfig, DiscoveryEvent};
