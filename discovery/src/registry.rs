//! UDN-keyed device registry with advertisement expiry.
//!
//! The registry is mutated only by the discovery engine's task; other
//! components observe it through [`DeviceRegistry::snapshot`]. Expiry is
//! driven by an `Instant` supplied by the caller, which keeps the sweep
//! logic deterministic under test.

use std::collections::HashMap;
use std::time::Instant;

use crate::ssdp::Advertisement;

/// A device currently known to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Unique Device Name
    pub udn: String,
    /// Notification type the device advertised under
    pub notification_type: String,
    /// URL of the device description document
    pub location: String,
    /// Deadline after which the device is considered gone
    pub expires_at: Instant,
}

/// Outcome of feeding an advertisement into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// The UDN was not known; a device appeared
    New,
    /// The UDN was already known; only the expiry deadline moved
    Refreshed,
}

/// Mapping from UDN to device record with monotonic expiry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an advertisement into the registry.
    ///
    /// A repeated advertisement for a known device updates only the expiry
    /// deadline; identity (UDN, location) is untouched and no new device
    /// appears.
    pub fn observe(&mut self, advertisement: &Advertisement, now: Instant) -> Observed {
        let expires_at = now + advertisement.max_age;

        match self.devices.get_mut(&advertisement.udn) {
            Some(record) => {
                record.expires_at = expires_at;
                Observed::Refreshed
            }
            None => {
                self.devices.insert(
                    advertisement.udn.clone(),
                    DeviceRecord {
                        udn: advertisement.udn.clone(),
                        notification_type: advertisement.notification_type.clone(),
                        location: advertisement.location.clone(),
                        expires_at,
                    },
                );
                Observed::New
            }
        }
    }

    /// Remove a device explicitly, e.g. on an `ssdp:byebye`.
    ///
    /// Returns the removed record, or `None` if the UDN was unknown.
    pub fn remove(&mut self, udn: &str) -> Option<DeviceRecord> {
        self.devices.remove(udn)
    }

    /// Remove every device whose advertised max-age has elapsed.
    ///
    /// Returns the removed records; each device appears in the returned
    /// list at most once since it leaves the map on removal.
    pub fn sweep(&mut self, now: Instant) -> Vec<DeviceRecord> {
        let expired: Vec<String> = self
            .devices
            .iter()
            .filter(|(_, record)| record.expires_at <= now)
            .map(|(udn, _)| udn.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|udn| self.devices.remove(&udn))
            .collect()
    }

    /// Look up a device by UDN.
    pub fn get(&self, udn: &str) -> Option<&DeviceRecord> {
        self.devices.get(udn)
    }

    /// Immutable snapshot of all known devices.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.values().cloned().collect()
    }

    /// Number of currently known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn advertisement(udn: &str, max_age: u64) -> Advertisement {
        Advertisement {
            udn: udn.to_string(),
            notification_type: "upnp:rootdevice".to_string(),
            location: format!("http://192.168.1.10/{udn}.xml"),
            max_age: Duration::from_secs(max_age),
            server: None,
        }
    }

    #[test]
    fn first_advertisement_is_new() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();

        assert_eq!(registry.observe(&advertisement("uuid:abc", 1800), now), Observed::New);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeated_advertisement_refreshes_without_new_identity() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        let adv = advertisement("uuid:abc", 1800);

        assert_eq!(registry.observe(&adv, now), Observed::New);

        // Same advertisement 60 seconds later only moves the deadline.
        let later = now + Duration::from_secs(60);
        assert_eq!(registry.observe(&adv, later), Observed::Refreshed);
        assert_eq!(registry.len(), 1);

        let record = registry.get("uuid:abc").unwrap();
        assert_eq!(record.expires_at, later + Duration::from_secs(1800));
    }

    #[test]
    fn sweep_removes_expired_devices_once() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();

        registry.observe(&advertisement("uuid:short", 10), now);
        registry.observe(&advertisement("uuid:long", 1800), now);

        let after_expiry = now + Duration::from_secs(11);
        let removed = registry.sweep(after_expiry);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].udn, "uuid:short");
        assert_eq!(registry.len(), 1);

        // A second sweep finds nothing; the device is only reported once.
        assert!(registry.sweep(after_expiry).is_empty());
    }

    #[test]
    fn refreshed_device_survives_original_deadline() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        let adv = advertisement("uuid:abc", 100);

        registry.observe(&adv, now);
        registry.observe(&adv, now + Duration::from_secs(60));

        // Past the original deadline but inside the refreshed one.
        assert!(registry.sweep(now + Duration::from_secs(101)).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn byebye_removal_returns_record() {
        let mut registry = DeviceRegistry::new();
        registry.observe(&advertisement("uuid:abc", 1800), Instant::now());

        let removed = registry.remove("uuid:abc").unwrap();
        assert_eq!(removed.udn, "uuid:abc");
        assert!(registry.is_empty());
        assert!(registry.remove("uuid:abc").is_none());
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let mut registry = DeviceRegistry::new();
        registry.observe(&advertisement("uuid:abc", 1800), Instant::now());

        let snapshot = registry.snapshot();
        registry.remove("uuid:abc");

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
