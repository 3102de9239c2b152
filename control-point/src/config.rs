//! Control point configuration.

use std::time::Duration;

use upnp_description::CacheConfig;
use upnp_discovery::DiscoveryConfig;

/// Configuration for a [`ControlPoint`](crate::ControlPoint).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use upnp_point::ControlPointConfig;
///
/// let config = ControlPointConfig {
///     subscription_timeout: Duration::from_secs(600),
///     renewal_margin: Duration::from_secs(60),
///     ..Default::default()
/// };
/// assert_eq!(config.max_retry_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// SSDP discovery settings
    pub discovery: DiscoveryConfig,
    /// Description fetching and caching settings
    pub cache: CacheConfig,
    /// Port range scanned for the GENA callback server
    pub callback_port_range: (u16, u16),
    /// Subscription timeout requested from devices
    pub subscription_timeout: Duration,
    /// How long before expiry a renewal is attempted
    pub renewal_margin: Duration,
    /// Maximum renewal attempts before a subscription is declared expired
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff between renewal attempts
    pub retry_backoff_base: Duration,
    /// Buffer size of the control point event channel
    pub event_buffer_size: usize,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            cache: CacheConfig::default(),
            callback_port_range: (3400, 3500),
            subscription_timeout: Duration::from_secs(1800),
            renewal_margin: Duration::from_secs(300),
            max_retry_attempts: 3,
            retry_backoff_base: Duration::from_secs(2),
            event_buffer_size: 100,
        }
    }
}
