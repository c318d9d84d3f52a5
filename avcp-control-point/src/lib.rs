//! # AV Control Point
//!
//! Discovery lifecycle coordination for UPnP/DLNA control points.
//!
//! ## Overview
//!
//! [`DiscoveryCoordinator`] keeps a discovery engine running on the host's
//! usable network interfaces and exposes what it finds as two registries,
//! media servers and media renderers, plus the user's current selection of
//! each. All methods are synchronous; the engine lives on a dedicated
//! lifecycle worker thread and the periodic search runs as a cancellable
//! task on a private runtime.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use avcp_control_point::prelude::*;
//!
//! let coordinator = DiscoveryCoordinator::builder()
//!     .config(ControlPointConfig::default())
//!     .on_server_selected(|server| println!("Server: {:?}", server.map(|s| &s.friendly_name)))
//!     .build()?;
//!
//! coordinator.initialize()?;
//! coordinator.search_start(DiscoveryListener::notify(|event| match event {
//!     DeviceEvent::Found(device) => println!("Found {}", device.friendly_name),
//!     DeviceEvent::Lost(device) => println!("Lost {}", device.friendly_name),
//! }))?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! if let Some(server) = coordinator.media_servers().first() {
//!     coordinator.set_selected_media_server(Some(server.clone()));
//! }
//!
//! coordinator.search_stop();
//! coordinator.terminate()?;
//! # Ok::<(), avcp_control_point::ControlPointError>(())
//! ```
//!
//! ## Architecture
//!
//! 1. **Reachability**: decides which interfaces the engine is bound to
//! 2. **Lifecycle worker**: sole owner of the [`ControlPointManager`]; every
//!    initialize, restart, teardown and search probe is a command it runs in order
//! 3. **Search loop**: one probe, then a sleep cancelled by `search_stop()`
//! 4. **Registries**: per-kind device tables fed by engine callbacks
//! 5. **Selection**: unsubscribe old, store, notify, subscribe new

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod manager;
pub mod platform;
pub mod reachability;
pub mod registry;
mod search;
pub mod selection;
mod worker;

pub use config::{ControlPointConfig, HostKind};
pub use coordinator::{DiscoveryCoordinator, DiscoveryCoordinatorBuilder};
pub use error::{ControlPointError, Result};
pub use manager::ControlPointManager;
pub use platform::Notice;
pub use registry::{DeviceRegistry, DiscoveryListener};

// Re-export commonly used types from the discovery crate
pub use avcp_discovery::{Device, DeviceEvent, DeviceKind};

/// Prelude module for convenient imports
///
/// ```rust
/// use avcp_control_point::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ControlPointConfig, ControlPointError, Device, DeviceEvent, DeviceKind, DiscoveryCoordinator,
        DiscoveryListener, Notice, Result,
    };
}
