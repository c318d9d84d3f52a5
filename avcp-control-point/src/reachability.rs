//! Network reachability
//!
//! Decides which interfaces the discovery engine is bound to and whether
//! the host has a network worth discovering on at all.

use std::sync::Arc;

use avcp_discovery::interface::{InterfaceSource, LinkKind, SystemInterfaces};
use avcp_discovery::{AddressFamily, NetworkInterface};
use tracing::debug;

use crate::config::{ControlPointConfig, HostKind};

pub trait NetworkReachability: Send + Sync {
    /// Interfaces the engine should be bound to
    fn available_interfaces(&self) -> Vec<NetworkInterface>;

    /// Whether the host currently has a usable network
    fn has_available_interface(&self) -> bool;
}

/// Reachability of a real host on a Wi-Fi or Ethernet LAN
pub struct LanReachability {
    source: Arc<dyn InterfaceSource>,
    family: AddressFamily,
}

impl LanReachability {
    pub fn new(source: Arc<dyn InterfaceSource>, family: AddressFamily) -> Self {
        Self { source, family }
    }
}

impl NetworkReachability for LanReachability {
    fn available_interfaces(&self) -> Vec<NetworkInterface> {
        self.source
            .interfaces()
            .into_iter()
            .filter(|iface| iface.is_usable(self.family))
            .collect()
    }

    fn has_available_interface(&self) -> bool {
        match self.source.active_network(self.family) {
            Some(active) => {
                let usable_link = matches!(active.kind, LinkKind::Wifi | LinkKind::Ethernet);
                debug!(
                    "Active network {} ({:?}, connected: {})",
                    active.interface, active.kind, active.connected
                );
                usable_link && active.connected
            }
            None => false,
        }
    }
}

/// Reachability of a virtualized host, whose network is always up
pub struct EmulatorReachability {
    source: Arc<dyn InterfaceSource>,
    family: AddressFamily,
}

impl EmulatorReachability {
    pub fn new(source: Arc<dyn InterfaceSource>, family: AddressFamily) -> Self {
        Self { source, family }
    }
}

impl NetworkReachability for EmulatorReachability {
    fn available_interfaces(&self) -> Vec<NetworkInterface> {
        self.source
            .interfaces()
            .into_iter()
            .filter(|iface| iface.has_family(self.family))
            .collect()
    }

    fn has_available_interface(&self) -> bool {
        true
    }
}

/// The reachability policy `config.host` asks for, on the host's interfaces
pub fn reachability_for(config: &ControlPointConfig) -> Arc<dyn NetworkReachability> {
    let source: Arc<dyn InterfaceSource> = Arc::new(SystemInterfaces);
    match config.host {
        HostKind::Device => Arc::new(LanReachability::new(source, config.address_family)),
        HostKind::Emulator => Arc::new(EmulatorReachability::new(source, config.address_family)),
    }
}
