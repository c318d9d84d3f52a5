//! UPnP AV device discovery
//!
//! This crate provides the discovery half of a UPnP/DLNA control point: the
//! device model, an SSDP engine that finds media servers and renderers on
//! the local network, and the contracts a control point drives it through.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use avcp_discovery::engine::{DiscoveryEngine, EngineFactory, InlineDispatcher};
//! use avcp_discovery::interface::{AddressFamily, InterfaceSource, SystemInterfaces};
//! use avcp_discovery::ssdp_engine::SsdpEngineFactory;
//! use avcp_discovery::DeviceEvent;
//!
//! let interfaces: Vec<_> = SystemInterfaces
//!     .interfaces()
//!     .into_iter()
//!     .filter(|iface| iface.is_usable(AddressFamily::Ipv4))
//!     .collect();
//!
//! let mut engine = SsdpEngineFactory::default()
//!     .build(&interfaces, Arc::new(InlineDispatcher))
//!     .unwrap();
//! engine.add_listener(Arc::new(|event: &DeviceEvent| {
//!     if let DeviceEvent::Found(device) = event {
//!         println!("Found {} at {}", device.friendly_name, device.location);
//!     }
//! }));
//! engine.initialize().unwrap();
//! engine.start().unwrap();
//! engine.search(None).unwrap();
//! ```

mod error;
mod ssdp;
pub mod device;
pub mod engine;
pub mod icon;
pub mod interface;
pub mod ssdp_engine;
pub mod subscription;

use std::sync::Arc;

use serde::Serialize;

pub use error::{DiscoveryError, Result};
pub use icon::{Icon, IconFilter, NoIconFilter, PreferredIconFilter};
pub use interface::{AddressFamily, NetworkInterface};
pub use ssdp::SEARCH_ALL;

/// A UPnP device found on the network.
///
/// Identity is the UDN; two `Device` values with the same UDN describe the
/// same device, possibly at different points in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Unique device name, e.g. `"uuid:4d696e69-444c-164e-9d41-b827eb1c4d1e"`
    pub udn: String,
    /// Device type URN, e.g. `"urn:schemas-upnp-org:device:MediaServer:1"`
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    /// URL of the device description
    pub location: String,
    /// Icon chosen by the engine's icon filter
    pub icon: Option<Icon>,
    pub services: Vec<ServiceInfo>,
    /// Added by fixed location rather than discovered
    pub pinned: bool,
}

/// A service advertised in a device description, with absolute URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
}

/// The device classes a control point tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceKind {
    MediaServer,
    MediaRenderer,
}

impl DeviceKind {
    /// Device type URN prefix, without the version suffix
    pub fn urn_prefix(&self) -> &'static str {
        match self {
            DeviceKind::MediaServer => "urn:schemas-upnp-org:device:MediaServer:",
            DeviceKind::MediaRenderer => "urn:schemas-upnp-org:device:MediaRenderer:",
        }
    }

    /// Whether `device_type` is any version of this kind
    pub fn matches(&self, device_type: &str) -> bool {
        device_type.trim().starts_with(self.urn_prefix())
    }
}

/// Events emitted by a discovery engine.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device announced itself or answered a search
    Found(Arc<Device>),
    /// A device said goodbye or its announcement expired
    Lost(Arc<Device>),
}

impl DeviceEvent {
    pub fn device(&self) -> &Arc<Device> {
        match self {
            DeviceEvent::Found(device) | DeviceEvent::Lost(device) => device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeviceKind::MediaServer, "urn:schemas-upnp-org:device:MediaServer:1", true)]
    #[case(DeviceKind::MediaServer, "urn:schemas-upnp-org:device:MediaServer:4", true)]
    #[case(DeviceKind::MediaServer, "urn:schemas-upnp-org:device:MediaRenderer:1", false)]
    #[case(DeviceKind::MediaRenderer, "urn:schemas-upnp-org:device:MediaRenderer:3", true)]
    #[case(DeviceKind::MediaRenderer, "urn:schemas-upnp-org:device:InternetGatewayDevice:1", false)]
    #[case(DeviceKind::MediaRenderer, "urn:schemas-upnp-org:device:MediaRendererX", false)]
    fn test_device_kind_matches(#[case] kind: DeviceKind, #[case] device_type: &str, #[case] expected: bool) {
        assert_eq!(kind.matches(device_type), expected);
    }

    #[test]
    fn test_device_serializes_to_json() {
        let device = Device {
            udn: "uuid:test-1".to_string(),
            device_type: "urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            friendly_name: "Test".to_string(),
            manufacturer: String::new(),
            model_name: String::new(),
            location: "http://192.168.1.2/desc.xml".to_string(),
            icon: None,
            services: Vec::new(),
            pinned: false,
        };

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["udn"], "uuid:test-1");
        assert_eq!(json["icon"], serde_json::Value::Null);
    }
}
