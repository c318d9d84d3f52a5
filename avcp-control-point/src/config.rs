//! Configuration for the discovery coordinator
//!
//! Controls the search cadence, the address family interfaces are selected
//! for, how the host's reachability is judged and which devices are pinned
//! by fixed description URL.

use std::time::Duration;

use avcp_discovery::AddressFamily;

use crate::error::{ControlPointError, Result};

/// The kind of host the control point runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKind {
    /// A real device; only Wi-Fi or Ethernet counts as a usable network
    #[default]
    Device,
    /// A virtualized host whose network is always considered reachable
    Emulator,
}

/// Configuration for the `DiscoveryCoordinator`
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// Pause between two search probes of the search loop
    /// Default: 5 seconds
    pub search_interval: Duration,

    /// SSDP search target; `None` searches for everything (`ssdp:all`)
    /// Default: None
    pub search_target: Option<String>,

    /// Address family interfaces must carry to be used
    /// Default: IPv4
    pub address_family: AddressFamily,

    /// Reachability policy
    /// Default: HostKind::Device
    pub host: HostKind,

    /// Description URLs of devices added on every search tick
    /// Default: empty
    pub pinned_locations: Vec<String>,

    /// Poll interval of the interface-polling connectivity monitor
    /// Default: 3 seconds
    pub connectivity_poll_interval: Duration,

    /// Upper bound `search_stop()` waits for the search loop to finish
    /// Default: 10 seconds
    pub search_stop_timeout: Duration,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            search_interval: Duration::from_secs(5),
            search_target: None,
            address_family: AddressFamily::Ipv4,
            host: HostKind::Device,
            pinned_locations: Vec::new(),
            connectivity_poll_interval: Duration::from_secs(3),
            search_stop_timeout: Duration::from_secs(10),
        }
    }
}

impl ControlPointConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighter search cadence for interactive device pickers
    pub fn fast_search() -> Self {
        Self {
            search_interval: Duration::from_secs(2),
            connectivity_poll_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Configuration for virtualized hosts
    pub fn emulator() -> Self {
        Self {
            host: HostKind::Emulator,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.search_interval.is_zero() {
            return Err(ControlPointError::Configuration(
                "search_interval must be greater than 0".to_string(),
            ));
        }

        if self.connectivity_poll_interval.is_zero() {
            return Err(ControlPointError::Configuration(
                "connectivity_poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.search_stop_timeout.is_zero() {
            return Err(ControlPointError::Configuration(
                "search_stop_timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(target) = &self.search_target {
            if target.trim().is_empty() {
                return Err(ControlPointError::Configuration(
                    "search_target must not be blank".to_string(),
                ));
            }
        }

        for location in &self.pinned_locations {
            if !(location.starts_with("http://") || location.starts_with("https://")) {
                return Err(ControlPointError::Configuration(format!(
                    "Pinned location is not an HTTP URL: {}",
                    location
                )));
            }
        }

        Ok(())
    }

    pub fn with_search_interval(mut self, interval: Duration) -> Self {
        self.search_interval = interval;
        self
    }

    pub fn with_search_target(mut self, target: impl Into<String>) -> Self {
        self.search_target = Some(target.into());
        self
    }

    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    pub fn with_host(mut self, host: HostKind) -> Self {
        self.host = host;
        self
    }

    pub fn with_pinned_location(mut self, location: impl Into<String>) -> Self {
        self.pinned_locations.push(location.into());
        self
    }

    pub fn with_connectivity_poll_interval(mut self, interval: Duration) -> Self {
        self.connectivity_poll_interval = interval;
        self
    }

    pub fn with_search_stop_timeout(mut self, timeout: Duration) -> Self {
        self.search_stop_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControlPointConfig::default();
        assert_eq!(config.search_interval, Duration::from_secs(5));
        assert_eq!(config.search_target, None);
        assert_eq!(config.address_family, AddressFamily::Ipv4);
        assert_eq!(config.host, HostKind::Device);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ControlPointConfig::fast_search().validate().is_ok());
        assert_eq!(ControlPointConfig::emulator().host, HostKind::Emulator);
        assert!(ControlPointConfig::emulator().validate().is_ok());
    }

    #[test]
    fn test_zero_search_interval_is_invalid() {
        let config = ControlPointConfig::new().with_search_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ControlPointError::Configuration(_))));
    }

    #[test]
    fn test_blank_search_target_is_invalid() {
        let config = ControlPointConfig::new().with_search_target("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pinned_location_must_be_http() {
        let config = ControlPointConfig::new()
            .with_pinned_location("http://192.168.1.20:8200/rootDesc.xml")
            .with_pinned_location("ftp://nas/desc.xml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = ControlPointConfig::new()
            .with_search_interval(Duration::from_millis(250))
            .with_search_target("urn:schemas-upnp-org:device:MediaServer:1")
            .with_address_family(AddressFamily::Ipv6)
            .with_search_stop_timeout(Duration::from_secs(1));

        assert_eq!(config.search_interval, Duration::from_millis(250));
        assert_eq!(
            config.search_target.as_deref(),
            Some("urn:schemas-upnp-org:device:MediaServer:1")
        );
        assert_eq!(config.address_family, AddressFamily::Ipv6);
        assert_eq!(config.search_stop_timeout, Duration::from_secs(1));
    }
}
