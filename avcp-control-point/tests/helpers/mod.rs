//! Test doubles for the discovery engine and the host network
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use avcp_control_point::platform::{ConnectivityCallback, ConnectivityMonitor};
use avcp_control_point::reachability::NetworkReachability;
use avcp_discovery::engine::{
    DiscoveryEngine, Dispatcher, EngineFactory, EngineListener, EventSubscriber, ListenerId,
};
use avcp_discovery::{
    Device, DeviceEvent, DiscoveryError, IconFilter, NetworkInterface, Result as DiscoveryResult,
};
use parking_lot::Mutex;

pub const SERVER_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";
pub const RENDERER_TYPE: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Shared, ordered record of everything the doubles and observers did
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }

    /// Entries starting with `prefix`, in order
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

pub fn device(udn: &str, device_type: &str, name: &str) -> Arc<Device> {
    Arc::new(Device {
        udn: udn.to_string(),
        device_type: device_type.to_string(),
        friendly_name: name.to_string(),
        manufacturer: "Test".to_string(),
        model_name: "Stub".to_string(),
        location: format!("http://192.168.1.50/{}.xml", udn),
        icon: None,
        services: Vec::new(),
        pinned: false,
    })
}

pub fn server(udn: &str) -> Arc<Device> {
    device(udn, SERVER_TYPE, udn)
}

pub fn renderer(udn: &str) -> Arc<Device> {
    device(udn, RENDERER_TYPE, udn)
}

pub fn eth0() -> NetworkInterface {
    NetworkInterface {
        name: "eth0".to_string(),
        is_up: true,
        is_multicast: true,
        is_loopback: false,
        addresses: vec!["192.168.1.10".parse().unwrap()],
    }
}

/// What the fake engines report back to the test
pub struct EngineProbe {
    pub log: EventLog,
    searches: AtomicUsize,
    builds: AtomicUsize,
    fail_initialize: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, EngineListener)>>,
    dispatcher: Mutex<Option<Arc<dyn Dispatcher>>>,
    announce_on_search: Mutex<Vec<Arc<Device>>>,
}

impl EngineProbe {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            searches: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
            fail_initialize: AtomicBool::new(false),
            next_listener: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
            dispatcher: Mutex::new(None),
            announce_on_search: Mutex::new(Vec::new()),
        })
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn fail_next_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// Devices reported as found on every search probe
    pub fn announce_on_search(&self, device: Arc<Device>) {
        self.announce_on_search.lock().push(device);
    }

    /// Deliver `event` to the current engine's listeners through its dispatcher
    pub fn emit(&self, event: DeviceEvent) {
        let listeners: Vec<EngineListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        let dispatcher = self.dispatcher.lock().clone();
        if let Some(dispatcher) = dispatcher {
            dispatcher.dispatch(Box::new(move || {
                for listener in &listeners {
                    listener(&event);
                }
            }));
        }
    }
}

pub struct FakeEngineFactory {
    pub probe: Arc<EngineProbe>,
}

impl FakeEngineFactory {
    pub fn new(probe: Arc<EngineProbe>) -> Arc<Self> {
        Arc::new(Self { probe })
    }
}

impl EngineFactory for FakeEngineFactory {
    fn build(
        &self,
        interfaces: &[NetworkInterface],
        dispatcher: Arc<dyn Dispatcher>,
    ) -> DiscoveryResult<Box<dyn DiscoveryEngine>> {
        self.probe.builds.fetch_add(1, Ordering::SeqCst);
        let names: Vec<&str> = interfaces.iter().map(|iface| iface.name.as_str()).collect();
        self.probe.log.push(format!("build {}", names.join(",")));
        *self.probe.dispatcher.lock() = Some(dispatcher);

        Ok(Box::new(FakeEngine {
            probe: Arc::clone(&self.probe),
            initialized: false,
            subscriber: Arc::new(FakeSubscriber {
                log: self.probe.log.clone(),
            }),
        }))
    }
}

pub struct FakeEngine {
    probe: Arc<EngineProbe>,
    initialized: bool,
    subscriber: Arc<FakeSubscriber>,
}

impl DiscoveryEngine for FakeEngine {
    fn initialize(&mut self) -> DiscoveryResult<()> {
        self.probe.log.push("initialize");
        if self.probe.fail_initialize.load(Ordering::SeqCst) {
            return Err(DiscoveryError::NetworkError("no socket".to_string()));
        }
        self.initialized = true;
        Ok(())
    }

    fn start(&mut self) -> DiscoveryResult<()> {
        if !self.initialized {
            return Err(DiscoveryError::NotReady);
        }
        self.probe.log.push("start");
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.log.push("stop");
    }

    fn terminate(&mut self) {
        self.probe.log.push("terminate");
        self.initialized = false;
    }

    fn search(&self, target: Option<&str>) -> DiscoveryResult<()> {
        if !self.initialized {
            return Err(DiscoveryError::NotReady);
        }
        self.probe.searches.fetch_add(1, Ordering::SeqCst);
        self.probe
            .log
            .push(format!("search {}", target.unwrap_or(avcp_discovery::SEARCH_ALL)));

        let announced = self.probe.announce_on_search.lock().clone();
        for device in announced {
            self.probe.emit(DeviceEvent::Found(device));
        }
        Ok(())
    }

    fn try_add_pinned_device(&self, location: &str) {
        self.probe.log.push(format!("pinned {}", location));
    }

    fn set_icon_filter(&mut self, _filter: Arc<dyn IconFilter>) {
        self.probe.log.push("icon filter");
    }

    fn add_listener(&mut self, listener: EngineListener) -> ListenerId {
        let id = ListenerId::new(self.probe.next_listener.fetch_add(1, Ordering::SeqCst));
        self.probe.listeners.lock().push((id, listener));
        self.probe.log.push(format!("add listener {}", id.as_u64()));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.probe.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
        self.probe.log.push(format!("remove listener {}", id.as_u64()));
    }

    fn subscriber(&self) -> Arc<dyn EventSubscriber> {
        Arc::clone(&self.subscriber) as Arc<dyn EventSubscriber>
    }
}

pub struct FakeSubscriber {
    log: EventLog,
}

impl EventSubscriber for FakeSubscriber {
    fn subscribe(&self, device: &Device) -> DiscoveryResult<()> {
        self.log.push(format!("subscribe {}", device.udn));
        Ok(())
    }

    fn unsubscribe(&self, device: &Device) -> DiscoveryResult<()> {
        self.log.push(format!("unsubscribe {}", device.udn));
        Ok(())
    }
}

/// Reachability the test switches on and off
pub struct StaticReachability {
    interfaces: Vec<NetworkInterface>,
    available: AtomicBool,
}

impl StaticReachability {
    pub fn new(interfaces: Vec<NetworkInterface>) -> Arc<Self> {
        Arc::new(Self {
            interfaces,
            available: AtomicBool::new(true),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl NetworkReachability for StaticReachability {
    fn available_interfaces(&self) -> Vec<NetworkInterface> {
        if self.available.load(Ordering::SeqCst) {
            self.interfaces.clone()
        } else {
            Vec::new()
        }
    }

    fn has_available_interface(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Monitor that keeps its callback after `unregister`, like a platform
/// signal already in flight when the coordinator shuts down
#[derive(Default)]
pub struct LingeringConnectivity {
    callback: Mutex<Option<ConnectivityCallback>>,
}

impl LingeringConnectivity {
    pub fn fire(&self) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl ConnectivityMonitor for LingeringConnectivity {
    fn register(&self, on_change: ConnectivityCallback) {
        *self.callback.lock() = Some(on_change);
    }

    fn unregister(&self) {}
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
