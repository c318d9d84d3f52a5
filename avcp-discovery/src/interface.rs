//! Network interface model and host enumeration.
//!
//! The engine is bound to a set of [`NetworkInterface`]s chosen by the
//! caller. [`SystemInterfaces`] enumerates the host's interfaces through
//! `getifaddrs` (via `get_if_addrs`); other sources can be plugged in through
//! [`InterfaceSource`], which is how tests and virtualized hosts provide
//! their own view of the network.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use get_if_addrs::IfAddr;
use serde::Serialize;
use tracing::warn;

/// Address family the control point operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

/// A host network interface with its flags and bound addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub is_up: bool,
    pub is_multicast: bool,
    pub is_loopback: bool,
    pub addresses: Vec<IpAddr>,
}

impl NetworkInterface {
    /// Interface carries at least one address of `family`
    pub fn has_family(&self, family: AddressFamily) -> bool {
        self.addresses.iter().any(|addr| family.matches(addr))
    }

    /// Up, multicast-capable, not loopback, and addressed in `family`
    pub fn is_usable(&self, family: AddressFamily) -> bool {
        self.is_up && self.is_multicast && !self.is_loopback && self.has_family(family)
    }

    pub fn ipv4_addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Kind of link an interface represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Wifi,
    Ethernet,
    Other,
}

impl LinkKind {
    /// Classify an interface by its conventional OS name
    pub fn from_interface_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("wl") || name.starts_with("wifi") || name.starts_with("ath") {
            LinkKind::Wifi
        } else if name.starts_with("eth") || name.starts_with("en") || name.starts_with("em") {
            LinkKind::Ethernet
        } else {
            LinkKind::Other
        }
    }
}

/// The network the host currently routes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNetwork {
    pub interface: String,
    pub kind: LinkKind,
    pub connected: bool,
}

/// Source of the host's interface list
pub trait InterfaceSource: Send + Sync {
    /// Enumerate interfaces. Implementations swallow enumeration errors and
    /// leave the failing interface out.
    fn interfaces(&self) -> Vec<NetworkInterface>;

    /// The active network, if any.
    ///
    /// The default classifies interfaces by name and prefers a usable
    /// Wi-Fi or Ethernet link, then any usable link, then any addressed
    /// non-loopback interface. Bridges and virtual links (`docker0`,
    /// `br-*`) listed ahead of the physical one do not hide it.
    fn active_network(&self, family: AddressFamily) -> Option<ActiveNetwork> {
        self.interfaces()
            .into_iter()
            .filter(|iface| !iface.is_loopback && iface.has_family(family))
            .map(|iface| ActiveNetwork {
                kind: LinkKind::from_interface_name(&iface.name),
                connected: iface.is_usable(family),
                interface: iface.name,
            })
            .min_by_key(|active| {
                let physical = matches!(active.kind, LinkKind::Wifi | LinkKind::Ethernet);
                match (active.connected, physical) {
                    (true, true) => 0,
                    (true, false) => 1,
                    (false, true) => 2,
                    (false, false) => 3,
                }
            })
    }
}

/// Host interfaces, enumerated with `getifaddrs`
///
/// `getifaddrs` only reports configured interfaces, so every listed
/// interface counts as up. IPv4 interfaces without a broadcast address
/// (point-to-point tunnels) are reported as not multicast-capable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        let entries = match get_if_addrs::get_if_addrs() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to enumerate network interfaces: {}", e);
                return Vec::new();
            }
        };

        let mut by_name: BTreeMap<String, NetworkInterface> = BTreeMap::new();
        for entry in entries {
            let loopback = entry.is_loopback();
            let multicast = match &entry.addr {
                IfAddr::V4(v4) => !loopback && v4.broadcast.is_some(),
                IfAddr::V6(_) => !loopback,
            };

            let iface = by_name
                .entry(entry.name.clone())
                .or_insert_with(|| NetworkInterface {
                    name: entry.name.clone(),
                    is_up: true,
                    is_multicast: false,
                    is_loopback: false,
                    addresses: Vec::new(),
                });
            iface.is_multicast |= multicast;
            iface.is_loopback |= loopback;
            iface.addresses.push(entry.ip());
        }

        by_name.into_values().collect()
    }
}
