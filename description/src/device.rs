//! Device description documents.
//!
//! A device description is the XML document advertised at an SSDP
//! `LOCATION` URL. It names the root device, its embedded devices, and
//! the services each one exposes. Service URLs in the document are
//! relative; they resolve against the `URLBase` element when present and
//! against the description URL otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::error::{DescriptionError, Result};
use crate::scpd::Scpd;

/// A service on a resolved device, with its schema attached.
#[derive(Debug, Clone)]
pub struct Service {
    /// UDN of the device the service belongs to
    pub device_udn: String,
    /// Service type URN, e.g. `urn:schemas-upnp-org:service:RenderingControl:1`
    pub service_type: String,
    /// Service identifier URN
    pub service_id: String,
    /// Absolute URL for SOAP control requests
    pub control_url: Url,
    /// Absolute URL for GENA subscription requests
    pub event_sub_url: Url,
    /// Absolute URL the SCPD was fetched from
    pub scpd_url: Url,
    /// Parsed service schema
    pub scpd: Arc<Scpd>,
}

/// A resolved device with its services and embedded devices.
#[derive(Debug, Clone)]
pub struct Device {
    /// Unique Device Name, `uuid:...`
    pub udn: String,
    /// Device type URN
    pub device_type: String,
    /// Human-readable name
    pub friendly_name: String,
    /// Manufacturer name, when declared
    pub manufacturer: Option<String>,
    /// Model name, when declared
    pub model_name: Option<String>,
    /// URL the description was fetched from
    pub location: Url,
    /// Services declared directly on this device
    pub services: Vec<Service>,
    /// Embedded devices
    pub embedded: Vec<Device>,
}

impl Device {
    /// Find a service by type URN, searching this device and all
    /// embedded devices depth-first.
    pub fn find_service(&self, service_type: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.service_type == service_type)
            .or_else(|| {
                self.embedded
                    .iter()
                    .find_map(|d| d.find_service(service_type))
            })
    }

    /// All services of this device and its embedded devices.
    pub fn all_services(&self) -> Vec<&Service> {
        let mut services: Vec<&Service> = self.services.iter().collect();
        for embedded in &self.embedded {
            services.extend(embedded.all_services());
        }
        services
    }
}

/// A parsed but unresolved description document.
///
/// Resolution happens in two steps so SCPD fetching stays outside the
/// parser: [`scpd_urls`](Self::scpd_urls) lists every schema the
/// document references, and [`resolve`](Self::resolve) builds the
/// [`Device`] tree once the caller has fetched them.
#[derive(Debug)]
pub struct DeviceDescription {
    location: Url,
    base: Url,
    root: RawDevice,
}

impl DeviceDescription {
    /// Parse a description document fetched from `location`.
    pub fn parse(xml: &str, location: &Url) -> Result<Self> {
        let raw: RawRoot = quick_xml::de::from_str(xml).map_err(|e| {
            DescriptionError::Parse(format!("failed to parse description at {location}: {e}"))
        })?;

        let base = match raw.url_base.as_deref() {
            Some(base) => Url::parse(base).map_err(|e| {
                DescriptionError::Parse(format!("invalid URLBase {base:?}: {e}"))
            })?,
            None => location.clone(),
        };

        Ok(Self {
            location: location.clone(),
            base,
            root: raw.device,
        })
    }

    /// Every SCPD URL the document references, resolved to absolute form.
    pub fn scpd_urls(&self) -> Result<Vec<Url>> {
        fn collect(device: &RawDevice, base: &Url, out: &mut Vec<Url>) -> Result<()> {
            for service in device.services() {
                out.push(resolve_url(base, &service.scpd_url)?);
            }
            for embedded in device.embedded() {
                collect(embedded, base, out)?;
            }
            Ok(())
        }

        let mut urls = Vec::new();
        collect(&self.root, &self.base, &mut urls)?;
        Ok(urls)
    }

    /// Build the resolved device tree.
    ///
    /// `scpds` must contain an entry for every URL returned by
    /// [`scpd_urls`](Self::scpd_urls).
    pub fn resolve(&self, scpds: &HashMap<Url, Arc<Scpd>>) -> Result<Device> {
        self.resolve_device(&self.root, scpds)
    }

    fn resolve_device(
        &self,
        raw: &RawDevice,
        scpds: &HashMap<Url, Arc<Scpd>>,
    ) -> Result<Device> {
        let services = raw
            .services()
            .iter()
            .map(|service| {
                let scpd_url = resolve_url(&self.base, &service.scpd_url)?;
                let scpd = scpds.get(&scpd_url).cloned().ok_or_else(|| {
                    DescriptionError::Parse(format!("missing SCPD for {scpd_url}"))
                })?;

                Ok(Service {
                    device_udn: raw.udn.clone(),
                    service_type: service.service_type.clone(),
                    service_id: service.service_id.clone(),
                    control_url: resolve_url(&self.base, &service.control_url)?,
                    event_sub_url: resolve_url(&self.base, &service.event_sub_url)?,
                    scpd_url,
                    scpd,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let embedded = raw
            .embedded()
            .iter()
            .map(|device| self.resolve_device(device, scpds))
            .collect::<Result<Vec<_>>>()?;

        Ok(Device {
            udn: raw.udn.clone(),
            device_type: raw.device_type.clone(),
            friendly_name: raw.friendly_name.clone(),
            manufacturer: raw.manufacturer.clone(),
            model_name: raw.model_name.clone(),
            location: self.location.clone(),
            services,
            embedded,
        })
    }
}

fn resolve_url(base: &Url, relative: &str) -> Result<Url> {
    base.join(relative).map_err(|e| {
        DescriptionError::Parse(format!("invalid URL {relative:?} against {base}: {e}"))
    })
}

#[derive(Debug, Deserialize)]
struct RawRoot {
    #[serde(rename = "URLBase")]
    url_base: Option<String>,
    device: RawDevice,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(rename = "deviceType")]
    device_type: String,
    #[serde(rename = "friendlyName")]
    friendly_name: String,
    manufacturer: Option<String>,
    #[serde(rename = "modelName")]
    model_name: Option<String>,
    #[serde(rename = "UDN")]
    udn: String,
    #[serde(rename = "serviceList")]
    service_list: Option<RawServiceList>,
    #[serde(rename = "deviceList")]
    device_list: Option<RawDeviceList>,
}

impl RawDevice {
    fn services(&self) -> &[RawService] {
        self.service_list
            .as_ref()
            .map(|list| list.services.as_slice())
            .unwrap_or(&[])
    }

    fn embedded(&self) -> &[RawDevice] {
        self.device_list
            .as_ref()
            .map(|list| list.devices.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct RawServiceList {
    #[serde(rename = "service", default)]
    services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(rename = "serviceType")]
    service_type: String,
    #[serde(rename = "serviceId")]
    service_id: String,
    #[serde(rename = "SCPDURL")]
    scpd_url: String,
    #[serde(rename = "controlURL")]
    control_url: String,
    #[serde(rename = "eventSubURL")]
    event_sub_url: String,
}

#[derive(Debug, Deserialize)]
struct RawDeviceList {
    #[serde(rename = "device", default)]
    devices: Vec<RawDevice>,
}
