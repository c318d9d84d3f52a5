//! Control point manager
//!
//! Owns at most one discovery engine and the lifecycle around it:
//! UNINITIALIZED → INITIALIZED → UNINITIALIZED. The manager is not
//! synchronized; the coordinator's lifecycle worker is its only owner.

use std::sync::Arc;

use avcp_discovery::engine::{DiscoveryEngine, Dispatcher, EngineFactory};
use avcp_discovery::{IconFilter, NetworkInterface};
use tracing::{debug, info};

use crate::error::{ControlPointError, Result};
use crate::registry::DeviceRegistry;
use crate::selection::SubscriberSlot;

/// Engine lifecycle for one set of interfaces
pub struct ControlPointManager {
    factory: Arc<dyn EngineFactory>,
    dispatcher: Arc<dyn Dispatcher>,
    icon_filter: Arc<dyn IconFilter>,
    servers: DeviceRegistry,
    renderers: DeviceRegistry,
    subscriber: SubscriberSlot,
    search_target: Option<String>,
    engine: Option<Box<dyn DiscoveryEngine>>,
}

impl ControlPointManager {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        dispatcher: Arc<dyn Dispatcher>,
        icon_filter: Arc<dyn IconFilter>,
        servers: DeviceRegistry,
        renderers: DeviceRegistry,
        subscriber: SubscriberSlot,
    ) -> Self {
        Self {
            factory,
            dispatcher,
            icon_filter,
            servers,
            renderers,
            subscriber,
            search_target: None,
            engine: None,
        }
    }

    /// Search target used by [`search`](Self::search); `None` searches for everything
    pub fn with_search_target(mut self, target: Option<String>) -> Self {
        self.search_target = target;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Build and initialize an engine bound to `interfaces`.
    ///
    /// An already initialized manager is terminated first. On failure the
    /// manager is left uninitialized.
    pub fn initialize(&mut self, interfaces: &[NetworkInterface]) -> Result<()> {
        if self.is_initialized() {
            debug!("Control point already initialized, terminating first");
            self.terminate();
        }

        let mut engine = self.factory.build(interfaces, Arc::clone(&self.dispatcher))?;
        engine.set_icon_filter(Arc::clone(&self.icon_filter));
        self.servers.bind(engine.as_mut());
        self.renderers.bind(engine.as_mut());

        if let Err(e) = engine.initialize() {
            self.renderers.unbind(engine.as_mut());
            self.servers.unbind(engine.as_mut());
            return Err(e.into());
        }

        self.subscriber.set(engine.subscriber());
        self.engine = Some(engine);

        let names: Vec<&str> = interfaces.iter().map(|iface| iface.name.as_str()).collect();
        info!("Control point initialized on {:?}", names);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.engine_mut()?.start()?;
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
    }

    /// Send one search probe
    pub fn search(&self) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(ControlPointError::NotInitialized)?;
        engine.search(self.search_target.as_deref())?;
        Ok(())
    }

    /// Ask the engine to load the device described at `location`
    pub fn add_pinned_device(&self, location: &str) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(ControlPointError::NotInitialized)?;
        engine.try_add_pinned_device(location);
        Ok(())
    }

    pub fn terminate(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        // Receive threads are joined before the registries let go
        engine.stop();
        self.subscriber.clear();
        self.renderers.unbind(engine.as_mut());
        self.servers.unbind(engine.as_mut());
        engine.terminate();
        info!("Control point terminated");
    }

    fn engine_mut(&mut self) -> Result<&mut Box<dyn DiscoveryEngine>> {
        self.engine.as_mut().ok_or(ControlPointError::NotInitialized)
    }
}

impl Drop for ControlPointManager {
    fn drop(&mut self) {
        self.terminate();
    }
}
