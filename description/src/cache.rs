//! Async description cache.
//!
//! Fetches device descriptions and their SCPDs over HTTP and keeps the
//! resolved [`Device`] trees keyed by description URL. Fetches are
//! retried with exponential backoff on transport failures; malformed
//! documents fail immediately since refetching will not fix them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use url::Url;

use crate::device::{Device, DeviceDescription};
use crate::error::{DescriptionError, Result};
use crate::scpd::Scpd;

/// Configuration for the description cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// HTTP request timeout
    pub timeout: Duration,
    /// Maximum fetch attempts per document
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_backoff_base: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(2),
        }
    }
}

/// Cache of resolved device descriptions keyed by location URL.
///
/// # Example
///
/// ```no_run
/// use upnp_description::{CacheConfig, DescriptionCache};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = DescriptionCache::new(CacheConfig::default())?;
///     let device = cache.device("http://192.168.1.50:1400/desc.xml").await?;
///     println!("{} ({})", device.friendly_name, device.udn);
///     Ok(())
/// }
/// ```
pub struct DescriptionCache {
    client: reqwest::Client,
    config: CacheConfig,
    devices: RwLock<HashMap<String, Arc<Device>>>,
}

impl DescriptionCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DescriptionError::Transport(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            config,
            devices: RwLock::new(HashMap::new()),
        })
    }

    /// The resolved device for a description URL, fetching on a miss.
    ///
    /// On a miss the description and every SCPD it references are
    /// fetched and parsed before the device is inserted; concurrent
    /// callers for the same location may fetch redundantly but agree on
    /// the cached result.
    pub async fn device(&self, location: &str) -> Result<Arc<Device>> {
        if let Some(device) = self.devices.read().await.get(location) {
            return Ok(device.clone());
        }

        let url = Url::parse(location).map_err(|e| {
            DescriptionError::Parse(format!("invalid description URL {location:?}: {e}"))
        })?;

        tracing::debug!(%url, "fetching device description");
        let xml = self.fetch(&url).await?;
        let description = DeviceDescription::parse(&xml, &url)?;

        let mut scpds: HashMap<Url, Arc<Scpd>> = HashMap::new();
        for scpd_url in description.scpd_urls()? {
            if scpds.contains_key(&scpd_url) {
                continue;
            }
            tracing::debug!(url = %scpd_url, "fetching SCPD");
            let body = self.fetch(&scpd_url).await?;
            scpds.insert(scpd_url, Arc::new(Scpd::from_xml(&body)?));
        }

        let device = Arc::new(description.resolve(&scpds)?);
        tracing::info!(
            udn = %device.udn,
            friendly_name = %device.friendly_name,
            services = device.all_services().len(),
            "device description cached"
        );

        self.devices
            .write()
            .await
            .insert(location.to_string(), device.clone());
        Ok(device)
    }

    /// The cached device for a location, if present.
    pub async fn cached(&self, location: &str) -> Option<Arc<Device>> {
        self.devices.read().await.get(location).cloned()
    }

    /// Drop the cached entry for a location.
    ///
    /// Returns true if an entry was removed. Called when the device
    /// disappears so a reappearance fetches a fresh description.
    pub async fn invalidate(&self, location: &str) -> bool {
        self.devices.write().await.remove(location).is_some()
    }

    /// Number of cached devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Fetch a document, retrying transport failures with backoff.
    async fn fetch(&self, url: &Url) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                let backoff = self.config.retry_backoff_base * 2u32.pow(attempt - 2);
                tracing::debug!(%url, attempt, ?backoff, "retrying fetch");
                tokio::time::sleep(backoff).await;
            }

            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    tracing::warn!(%url, attempt, error = %e, "fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DescriptionError::Transport(format!("no fetch attempts made for {url}"))
        }))
    }

    async fn try_fetch(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DescriptionError::Transport(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DescriptionError::Transport(format!(
                "GET {url} returned {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DescriptionError::Transport(format!("reading {url} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Test Renderer</friendlyName>
    <UDN>uuid:test-renderer</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/rc.xml</SCPDURL>
        <controlURL>/rc/control</controlURL>
        <eventSubURL>/rc/event</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    const SCPD_XML: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <serviceStateTable>
    <stateVariable sendEvents="yes">
      <name>Volume</name>
      <dataType>ui2</dataType>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    fn test_config() -> CacheConfig {
        CacheConfig {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff_base: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn fetch_resolves_and_caches() {
        let mut server = mockito::Server::new_async().await;

        let desc_mock = server
            .mock("GET", "/desc.xml")
            .with_status(200)
            .with_body(DESCRIPTION_XML)
            .expect(1)
            .create_async()
            .await;
        let scpd_mock = server
            .mock("GET", "/rc.xml")
            .with_status(200)
            .with_body(SCPD_XML)
            .expect(1)
            .create_async()
            .await;

        let cache = DescriptionCache::new(test_config()).unwrap();
        let location = format!("{}/desc.xml", server.url());

        let device = cache.device(&location).await.unwrap();
        assert_eq!(device.udn, "uuid:test-renderer");
        assert_eq!(device.services.len(), 1);
        assert!(device.services[0]
            .scpd
            .state_variable("Volume")
            .is_some());

        // Second lookup is served from the cache
        let again = cache.device(&location).await.unwrap();
        assert!(Arc::ptr_eq(&device, &again));
        assert_eq!(cache.len().await, 1);

        desc_mock.assert_async().await;
        scpd_mock.assert_async().await;
    }

    #[tokio::test]
    async fn transport_errors_exhaust_retries() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/desc.xml")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let cache = DescriptionCache::new(test_config()).unwrap();
        let location = format!("{}/desc.xml", server.url());

        let result = cache.device(&location).await;
        assert!(matches!(result, Err(DescriptionError::Transport(_))));
        assert!(cache.is_empty().await);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn parse_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/desc.xml")
            .with_status(200)
            .with_body("this is not a description")
            .expect(1)
            .create_async()
            .await;

        let cache = DescriptionCache::new(test_config()).unwrap();
        let location = format!("{}/desc.xml", server.url());

        let result = cache.device(&location).await;
        assert!(matches!(result, Err(DescriptionError::Parse(_))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let mut server = mockito::Server::new_async().await;

        let desc_mock = server
            .mock("GET", "/desc.xml")
            .with_status(200)
            .with_body(DESCRIPTION_XML)
            .expect(2)
            .create_async()
            .await;
        let scpd_mock = server
            .mock("GET", "/rc.xml")
            .with_status(200)
            .with_body(SCPD_XML)
            .expect(2)
            .create_async()
            .await;

        let cache = DescriptionCache::new(test_config()).unwrap();
        let location = format!("{}/desc.xml", server.url());

        cache.device(&location).await.unwrap();
        assert!(cache.invalidate(&location).await);
        assert!(!cache.invalidate(&location).await);
        assert!(cache.cached(&location).await.is_none());

        cache.device(&location).await.unwrap();

        desc_mock.assert_async().await;
        scpd_mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_location_url_is_a_parse_error() {
        let cache = DescriptionCache::new(test_config()).unwrap();
        let result = cache.device("not a url").await;
        assert!(matches!(result, Err(DescriptionError::Parse(_))));
    }
}
