//! Per-kind device registries
//!
//! A [`DeviceRegistry`] listens to an engine's device events, keeps the
//! devices of one [`DeviceKind`] in first-discovery order and forwards each
//! accepted event to an optional [`DiscoveryListener`].
//!
//! Registries are cheap to clone; clones share the same table.
//!
//! Each [`bind`](DeviceRegistry::bind) opens a new binding generation.
//! Engine callbacks carry the generation they were registered with and are
//! dropped once that binding is gone, so events an engine queued before
//! [`unbind`](DeviceRegistry::unbind) never repopulate the table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use avcp_discovery::engine::{DiscoveryEngine, ListenerId};
use avcp_discovery::{Device, DeviceEvent, DeviceKind};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

/// Callback invoked for registry changes
pub type DiscoveryCallback = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// What to do with device events a registry accepts
#[derive(Clone, Default)]
pub enum DiscoveryListener {
    /// Drop them
    #[default]
    Ignore,
    /// Forward them to a callback
    Notify(DiscoveryCallback),
}

impl DiscoveryListener {
    /// Wrap a closure as a `Notify` listener
    pub fn notify<F>(callback: F) -> Self
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        DiscoveryListener::Notify(Arc::new(callback))
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, DiscoveryListener::Ignore)
    }

    fn deliver(&self, event: &DeviceEvent) {
        if let DiscoveryListener::Notify(callback) = self {
            callback(event);
        }
    }
}

impl std::fmt::Debug for DiscoveryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryListener::Ignore => f.write_str("Ignore"),
            DiscoveryListener::Notify(_) => f.write_str("Notify(..)"),
        }
    }
}

struct Binding {
    id: ListenerId,
    generation: u64,
}

struct Inner {
    kind: DeviceKind,
    devices: RwLock<Vec<Arc<Device>>>,
    listener: RwLock<DiscoveryListener>,
    binding: Mutex<Option<Binding>>,
    generations: AtomicU64,
}

/// Devices of one kind known to the bound engine
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<Inner>,
}

impl DeviceRegistry {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                devices: RwLock::new(Vec::new()),
                listener: RwLock::new(DiscoveryListener::Ignore),
                binding: Mutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.inner.kind
    }

    /// Start receiving `engine`'s device events.
    ///
    /// A registry follows one engine at a time; binding again replaces the
    /// previous listener handle.
    pub fn bind(&self, engine: &mut dyn DiscoveryEngine) {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        let id = engine.add_listener(Arc::new(move |event: &DeviceEvent| {
            inner.handle_bound(generation, event)
        }));

        if let Some(previous) = self.inner.binding.lock().replace(Binding { id, generation }) {
            warn!(
                "{:?} registry was still bound (listener {}), rebinding",
                self.inner.kind,
                previous.id.as_u64()
            );
        }
        debug!("{:?} registry bound as listener {}", self.inner.kind, id.as_u64());
    }

    /// Stop receiving `engine`'s events and forget its devices.
    ///
    /// Callbacks the engine already dispatched but has not run yet are
    /// discarded when they arrive.
    pub fn unbind(&self, engine: &mut dyn DiscoveryEngine) {
        let previous = {
            let mut binding = self.inner.binding.lock();
            let previous = binding.take();
            self.inner.devices.write().clear();
            previous
        };

        if let Some(previous) = previous {
            engine.remove_listener(previous.id);
            debug!("{:?} registry unbound", self.inner.kind);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    pub fn device_count(&self) -> usize {
        self.inner.devices.read().len()
    }

    /// Snapshot of the known devices in first-discovery order
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.devices.read().clone()
    }

    pub fn find(&self, udn: &str) -> Option<Arc<Device>> {
        self.inner
            .devices
            .read()
            .iter()
            .find(|device| device.udn == udn)
            .cloned()
    }

    pub fn set_discovery_listener(&self, listener: DiscoveryListener) {
        *self.inner.listener.write() = listener;
    }

    /// Feed an event directly, whether or not an engine is bound
    pub fn handle_event(&self, event: &DeviceEvent) {
        if self.inner.apply(event) {
            self.inner.deliver(event);
        }
    }
}

impl Inner {
    /// Engine callback path; drops events from a binding that has ended
    fn handle_bound(&self, generation: u64, event: &DeviceEvent) {
        let changed = {
            let binding = self.binding.lock();
            if binding.as_ref().map(|b| b.generation) != Some(generation) {
                trace!(
                    "{:?} registry dropped event for {} from a stale binding",
                    self.kind,
                    event.device().udn
                );
                return;
            }
            self.apply(event)
        };

        if changed {
            self.deliver(event);
        }
    }

    /// Update the table; returns whether anything changed
    fn apply(&self, event: &DeviceEvent) -> bool {
        if !self.kind.matches(&event.device().device_type) {
            return false;
        }

        let changed = {
            let mut devices = self.devices.write();
            match event {
                DeviceEvent::Found(device) => {
                    match devices.iter_mut().find(|known| known.udn == device.udn) {
                        Some(slot) => *slot = Arc::clone(device),
                        None => devices.push(Arc::clone(device)),
                    }
                    true
                }
                DeviceEvent::Lost(device) => {
                    let before = devices.len();
                    devices.retain(|known| known.udn != device.udn);
                    devices.len() != before
                }
            }
        };

        if !changed {
            trace!("{:?} registry ignored loss of unknown device {}", self.kind, event.device().udn);
        }
        changed
    }

    fn deliver(&self, event: &DeviceEvent) {
        let listener = self.listener.read().clone();
        listener.deliver(event);
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("kind", &self.inner.kind)
            .field("devices", &self.device_count())
            .field("bound", &self.is_bound())
            .finish()
    }
}
