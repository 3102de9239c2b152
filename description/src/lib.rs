//! Device and service description handling for UPnP control points.
//!
//! This crate fetches device description documents and the SCPDs they
//! reference, parses them into typed models, and caches the resolved
//! device trees by description URL:
//!
//! - [`DescriptionCache`] fetches and caches [`Device`] trees
//! - [`Scpd`] holds a service's declared actions and state variables
//! - [`DataType`] and [`Value`] coerce argument values against the schema
//!
//! # Example
//!
//! ```no_run
//! use upnp_description::{CacheConfig, DescriptionCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = DescriptionCache::new(CacheConfig::default())?;
//!
//!     let device = cache.device("http://192.168.1.50:1400/desc.xml").await?;
//!     for service in device.all_services() {
//!         println!("{}: {} actions", service.service_type, service.scpd.actions.len());
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod device;
mod error;
mod scpd;
mod value;

pub use cache::{CacheConfig, DescriptionCache};
pub use device::{Device, DeviceDescription, Service};
pub use error::{DescriptionError, Result};
pub use scpd::{Action, AllowedRange, Argument, Direction, Scpd, StateVariable};
pub use value::{DataType, Value, ValueError};
