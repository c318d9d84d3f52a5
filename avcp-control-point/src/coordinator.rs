//! Discovery coordinator
//!
//! The facade applications talk to. It owns the lifecycle worker (and with
//! it the [`ControlPointManager`]), the periodic search loop, the media
//! server and renderer registries, and the selection state.
//!
//! All methods are synchronous. Restart callbacks and notices run on the
//! lifecycle worker thread and must not call [`DiscoveryCoordinator::initialize_or_terminate`],
//! [`DiscoveryCoordinator::restart`], [`DiscoveryCoordinator::terminate`],
//! [`DiscoveryCoordinator::on_connectivity_changed`] or
//! [`DiscoveryCoordinator::add_pinned_device`], which wait on that same thread.
//! The same holds for selection observers, since the worker re-subscribes
//! the current selections after every fresh engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use avcp_discovery::engine::{Dispatcher, EngineFactory, InlineDispatcher};
use avcp_discovery::interface::SystemInterfaces;
use avcp_discovery::ssdp_engine::SsdpEngineFactory;
use avcp_discovery::{Device, DeviceKind, IconFilter, PreferredIconFilter};
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::ControlPointConfig;
use crate::error::{ControlPointError, Result};
use crate::manager::ControlPointManager;
use crate::platform::{
    log_notices, ConnectivityMonitor, InterfacePollingMonitor, KeepAlive, NoticeHandler,
    RefCountedKeepAlive,
};
use crate::reachability::{reachability_for, NetworkReachability};
use crate::registry::{DeviceRegistry, DiscoveryListener};
use crate::search::SearchLoop;
use crate::selection::{Selection, SelectionObserver, SubscriberSlot};
use crate::worker::{request, spawn_lifecycle_worker, Command, Lifecycle};

/// Discovery lifecycle and device selection for one control point
pub struct DiscoveryCoordinator {
    config: ControlPointConfig,
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    runtime: Option<Runtime>,
    search: Mutex<Option<SearchLoop>>,
    /// Held for the whole of `initialize` and `terminate`
    transition: Mutex<()>,
    /// Shared with the worker, which drops connectivity signals while unset
    initialized: Arc<AtomicBool>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    keep_alive: Arc<dyn KeepAlive>,
    servers: DeviceRegistry,
    renderers: DeviceRegistry,
    subscriber: SubscriberSlot,
    selected_server: Arc<Selection>,
    selected_renderer: Arc<Selection>,
}

impl DiscoveryCoordinator {
    pub fn builder() -> DiscoveryCoordinatorBuilder {
        DiscoveryCoordinatorBuilder::default()
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Register for connectivity changes, keep the network awake and bring
    /// the control point up if a network is available. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let _transition = self.transition.lock();
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let commands = self.commands.clone();
        self.connectivity.register(Arc::new(move || {
            if commands
                .send(Command::ConnectivityChanged { reply: None })
                .is_err()
            {
                debug!("Connectivity change after lifecycle worker shut down");
            }
        }));
        self.keep_alive.acquire();
        self.initialized.store(true, Ordering::SeqCst);

        let active = self.on_connectivity_changed()?;
        info!("Discovery coordinator initialized (active: {})", active);
        Ok(())
    }

    /// Clear the server selection, shut the control point down and release
    /// platform resources. Idempotent.
    ///
    /// A running search loop keeps running and skips its ticks until
    /// [`search_stop`](Self::search_stop) is called.
    pub fn terminate(&self) -> Result<()> {
        let _transition = self.transition.lock();
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.set_selected_media_server(None);
        let stopped = request(&self.commands, |reply| Command::Terminate { reply });
        self.connectivity.unregister();
        self.keep_alive.release();

        info!("Discovery coordinator terminated");
        stopped
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether the control point is currently up
    pub fn is_active(&self) -> Result<bool> {
        request(&self.commands, |reply| Command::IsActive { reply })
    }

    /// Bring the control point up (`desired` and a usable interface exists)
    /// or down. Returns whether it ended up active.
    pub fn initialize_or_terminate(&self, desired: bool) -> Result<bool> {
        request(&self.commands, |reply| Command::Reconcile { desired, reply })
    }

    /// Re-check reachability and reconcile, issuing a no-network notice when
    /// the control point ends up inactive
    pub fn on_connectivity_changed(&self) -> Result<bool> {
        request(&self.commands, |reply| Command::ConnectivityChanged { reply: Some(reply) })
    }

    /// Tear the control point down, run `callback`, then bring it back up
    /// on a fresh interface snapshot.
    ///
    /// Without a usable network, issues a no-network notice and returns
    /// `false` without running `callback`.
    pub fn restart<F>(&self, callback: F) -> Result<bool>
    where
        F: FnOnce() + Send + 'static,
    {
        request(&self.commands, |reply| Command::Restart {
            callback: Box::new(callback),
            reply,
        })
    }

    /// Start searching periodically, replacing any running search loop.
    /// `listener` receives media server events.
    pub fn search_start(&self, listener: DiscoveryListener) -> Result<()> {
        let mut search = self.search.lock();
        if let Some(previous) = search.take() {
            previous.stop(self.config.search_stop_timeout);
        }

        let runtime = self
            .runtime
            .as_ref()
            .ok_or(ControlPointError::WorkerDisconnected)?;

        self.servers.set_discovery_listener(listener);
        *search = Some(SearchLoop::spawn(
            runtime.handle(),
            self.commands.clone(),
            self.config.search_interval,
        ));
        Ok(())
    }

    /// Stop the search loop. No probe is sent after this returns.
    pub fn search_stop(&self) {
        let mut search = self.search.lock();
        if let Some(running) = search.take() {
            running.stop(self.config.search_stop_timeout);
        }
        self.servers.set_discovery_listener(DiscoveryListener::Ignore);
    }

    pub fn is_searching(&self) -> bool {
        self.search.lock().is_some()
    }

    pub fn set_ms_discovery_listener(&self, listener: DiscoveryListener) {
        self.servers.set_discovery_listener(listener);
    }

    pub fn media_servers(&self) -> Vec<Arc<Device>> {
        self.servers.devices()
    }

    pub fn media_renderers(&self) -> Vec<Arc<Device>> {
        self.renderers.devices()
    }

    pub fn find_media_server(&self, udn: &str) -> Option<Arc<Device>> {
        self.servers.find(udn)
    }

    pub fn find_media_renderer(&self, udn: &str) -> Option<Arc<Device>> {
        self.renderers.find(udn)
    }

    pub fn server_registry(&self) -> &DeviceRegistry {
        &self.servers
    }

    pub fn renderer_registry(&self) -> &DeviceRegistry {
        &self.renderers
    }

    /// Load the device described at `location` into the running engine
    pub fn add_pinned_device(&self, location: &str) -> Result<()> {
        let location = location.to_string();
        request(&self.commands, |reply| Command::AddPinned { location, reply })?
    }

    pub fn selected_media_server(&self) -> Option<Arc<Device>> {
        self.selected_server.get()
    }

    pub fn set_selected_media_server(&self, device: Option<Arc<Device>>) {
        self.selected_server.set(&self.subscriber, device);
    }

    pub fn is_selected_media_server(&self, device: &Device) -> bool {
        self.selected_server.is_selected(device)
    }

    pub fn selected_media_renderer(&self) -> Option<Arc<Device>> {
        self.selected_renderer.get()
    }

    pub fn set_selected_media_renderer(&self, device: Option<Arc<Device>>) {
        self.selected_renderer.set(&self.subscriber, device);
    }

    pub fn clear_selected_renderer(&self) {
        self.set_selected_media_renderer(None);
    }
}

impl Drop for DiscoveryCoordinator {
    fn drop(&mut self) {
        self.search_stop();
        if let Err(e) = self.terminate() {
            debug!("Terminate during drop failed: {}", e);
        }

        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Lifecycle worker panicked");
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Builder for [`DiscoveryCoordinator`]
///
/// Every collaborator has a working default for a real LAN host: SSDP
/// engine, host interfaces, interface polling, a logging notice handler.
#[derive(Default)]
pub struct DiscoveryCoordinatorBuilder {
    config: Option<ControlPointConfig>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    reachability: Option<Arc<dyn NetworkReachability>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    keep_alive: Option<Arc<dyn KeepAlive>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    icon_filter: Option<Arc<dyn IconFilter>>,
    notices: Option<NoticeHandler>,
    on_server_selected: Option<SelectionObserver>,
    on_renderer_selected: Option<SelectionObserver>,
}

impl DiscoveryCoordinatorBuilder {
    pub fn config(mut self, config: ControlPointConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn reachability(mut self, reachability: Arc<dyn NetworkReachability>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    pub fn connectivity_monitor(mut self, monitor: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    pub fn keep_alive(mut self, keep_alive: Arc<dyn KeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Where engine callbacks (and therefore registry updates) run
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn icon_filter(mut self, filter: Arc<dyn IconFilter>) -> Self {
        self.icon_filter = Some(filter);
        self
    }

    pub fn notice_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(crate::platform::Notice) + Send + Sync + 'static,
    {
        self.notices = Some(Arc::new(handler));
        self
    }

    pub fn on_server_selected<F>(mut self, observer: F) -> Self
    where
        F: Fn(Option<&Arc<Device>>) + Send + Sync + 'static,
    {
        self.on_server_selected = Some(Arc::new(observer));
        self
    }

    pub fn on_renderer_selected<F>(mut self, observer: F) -> Self
    where
        F: Fn(Option<&Arc<Device>>) + Send + Sync + 'static,
    {
        self.on_renderer_selected = Some(Arc::new(observer));
        self
    }

    /// Validate the configuration, spawn the lifecycle worker and the search
    /// runtime. The coordinator starts uninitialized.
    pub fn build(self) -> Result<DiscoveryCoordinator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reachability = self.reachability.unwrap_or_else(|| reachability_for(&config));
        let connectivity = self.connectivity.unwrap_or_else(|| {
            Arc::new(InterfacePollingMonitor::new(
                Arc::new(SystemInterfaces),
                config.address_family,
                config.connectivity_poll_interval,
            ))
        });
        let engine_factory = self
            .engine_factory
            .unwrap_or_else(|| Arc::new(SsdpEngineFactory::default()));

        let servers = DeviceRegistry::new(DeviceKind::MediaServer);
        let renderers = DeviceRegistry::new(DeviceKind::MediaRenderer);
        let subscriber = SubscriberSlot::new();
        let selected_server = Arc::new(Selection::new("media server", self.on_server_selected));
        let selected_renderer =
            Arc::new(Selection::new("media renderer", self.on_renderer_selected));

        let manager = ControlPointManager::new(
            engine_factory,
            self.dispatcher.unwrap_or_else(|| Arc::new(InlineDispatcher)),
            self.icon_filter.unwrap_or_else(|| Arc::new(PreferredIconFilter)),
            servers.clone(),
            renderers.clone(),
            subscriber.clone(),
        )
        .with_search_target(config.search_target.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("avcp-search")
            .enable_time()
            .build()?;

        let initialized = Arc::new(AtomicBool::new(false));
        let (commands, command_rx) = mpsc::channel();
        let worker = spawn_lifecycle_worker(
            Lifecycle {
                manager,
                reachability,
                notices: self.notices.unwrap_or_else(log_notices),
                pinned_locations: config.pinned_locations.clone(),
                subscriber: subscriber.clone(),
                selections: vec![Arc::clone(&selected_server), Arc::clone(&selected_renderer)],
                accepting_signals: Arc::clone(&initialized),
            },
            command_rx,
        )?;

        Ok(DiscoveryCoordinator {
            config,
            commands,
            worker: Some(worker),
            runtime: Some(runtime),
            search: Mutex::new(None),
            transition: Mutex::new(()),
            initialized,
            connectivity,
            keep_alive: self.keep_alive.unwrap_or_else(|| Arc::new(RefCountedKeepAlive::new())),
            servers,
            renderers,
            subscriber,
            selected_server,
            selected_renderer,
        })
    }
}
