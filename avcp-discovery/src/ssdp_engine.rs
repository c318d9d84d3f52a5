//! SSDP implementation of the discovery engine.
//!
//! One search socket is opened per IPv4 interface address, plus an optional
//! NOTIFY listener on port 1900. While started, a receive thread per socket:
//! 1. Parses M-SEARCH answers and NOTIFY announcements
//! 2. Fetches the description of every device it has not seen yet
//! 3. Dispatches `Found` / `Lost` events to the registered listeners
//! 4. Expires devices whose `max-age` ran out without a re-announcement
//!
//! Description fetches happen on the receive thread, bounded by the HTTP
//! timeout.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use reqwest::blocking::Client;
use tracing::{debug, info, trace, warn};

use crate::device::Root;
use crate::engine::{
    DiscoveryEngine, Dispatcher, EngineFactory, EngineListener, EventSubscriber, ListenerId,
};
use crate::error::{DiscoveryError, Result};
use crate::icon::{IconFilter, PreferredIconFilter};
use crate::interface::NetworkInterface;
use crate::ssdp::{self, SsdpMessage, SEARCH_ALL};
use crate::subscription::GenaSubscriber;
use crate::{Device, DeviceEvent};

/// Configuration for [`SsdpEngine`]
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// `MX` header of M-SEARCH requests, in seconds
    /// Default: 2
    pub mx: u32,

    /// `USER-AGENT` header of M-SEARCH requests
    pub user_agent: String,

    /// Socket read timeout; bounds how long `stop()` waits for receive threads
    /// Default: 500 milliseconds
    pub receive_timeout: Duration,

    /// Timeout for description fetches and GENA requests
    /// Default: 3 seconds
    pub http_timeout: Duration,

    /// GENA `CALLBACK` URL. Without one, subscriptions are skipped.
    /// Default: None
    pub callback_url: Option<String>,

    /// Requested GENA subscription lifetime
    /// Default: 1800 seconds
    pub subscription_timeout: Duration,

    /// Join the multicast group on port 1900 to receive NOTIFY announcements
    /// Default: true
    pub listen_for_notify: bool,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            mx: 2,
            user_agent: format!(
                "{}/1.0 UPnP/1.0 avcp/{}",
                std::env::consts::OS,
                env!("CARGO_PKG_VERSION")
            ),
            receive_timeout: Duration::from_millis(500),
            http_timeout: Duration::from_secs(3),
            callback_url: None,
            subscription_timeout: Duration::from_secs(1800),
            listen_for_notify: true,
        }
    }
}

impl SsdpConfig {
    pub fn with_mx(mut self, mx: u32) -> Self {
        self.mx = mx;
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_listen_for_notify(mut self, listen: bool) -> Self {
        self.listen_for_notify = listen;
        self
    }
}

/// Builds [`SsdpEngine`]s
#[derive(Debug, Clone, Default)]
pub struct SsdpEngineFactory {
    config: SsdpConfig,
}

impl SsdpEngineFactory {
    pub fn new(config: SsdpConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for SsdpEngineFactory {
    fn build(
        &self,
        interfaces: &[NetworkInterface],
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Box<dyn DiscoveryEngine>> {
        Ok(Box::new(SsdpEngine::new(self.config.clone(), interfaces, dispatcher)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    Initialized,
    Started,
    Terminated,
}

struct Tracked {
    device: Arc<Device>,
    /// `None` for pinned devices
    expires_at: Option<Instant>,
}

/// State shared with receive threads and pinned-device loaders
struct Shared {
    dispatcher: Arc<dyn Dispatcher>,
    http: Client,
    running: AtomicBool,
    ready: AtomicBool,
    devices: Mutex<HashMap<String, Tracked>>,
    pending: Mutex<HashSet<String>>,
    listeners: RwLock<Vec<(ListenerId, EngineListener)>>,
    next_listener_id: AtomicU64,
    icon_filter: RwLock<Arc<dyn IconFilter>>,
}

/// SSDP discovery engine bound to a set of interfaces
pub struct SsdpEngine {
    config: SsdpConfig,
    interface_addrs: Vec<Ipv4Addr>,
    shared: Arc<Shared>,
    subscriber: Arc<GenaSubscriber>,
    sockets: Vec<Arc<UdpSocket>>,
    receivers: Vec<JoinHandle<()>>,
    state: EngineState,
}

impl SsdpEngine {
    pub fn new(
        config: SsdpConfig,
        interfaces: &[NetworkInterface],
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let interface_addrs: Vec<Ipv4Addr> = interfaces
            .iter()
            .flat_map(|iface| iface.ipv4_addresses())
            .filter(|addr| !addr.is_loopback())
            .collect();

        let subscriber = Arc::new(GenaSubscriber::new(
            http.clone(),
            config.callback_url.clone(),
            config.subscription_timeout,
        ));

        Ok(Self {
            config,
            interface_addrs,
            shared: Arc::new(Shared {
                dispatcher,
                http,
                running: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                devices: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashSet::new()),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                icon_filter: RwLock::new(Arc::new(PreferredIconFilter)),
            }),
            subscriber,
            sockets: Vec::new(),
            receivers: Vec::new(),
            state: EngineState::Idle,
        })
    }

    /// Devices currently known to the engine
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.shared
            .devices
            .lock()
            .values()
            .map(|tracked| Arc::clone(&tracked.device))
            .collect()
    }

    fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Initialized | EngineState::Started)
    }

    fn spawn_receiver(&mut self, socket: Arc<UdpSocket>, name: &str) {
        let shared = Arc::clone(&self.shared);
        let pause = self.config.receive_timeout;
        match thread::Builder::new()
            .name(name.to_string())
            .spawn(move || receive_loop(shared, socket, pause))
        {
            Ok(handle) => self.receivers.push(handle),
            Err(e) => warn!("Failed to spawn SSDP receive thread: {}", e),
        }
    }
}

impl DiscoveryEngine for SsdpEngine {
    fn initialize(&mut self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let mut sockets = Vec::new();
        for addr in &self.interface_addrs {
            match ssdp::search_socket(*addr, self.config.receive_timeout) {
                Ok(socket) => sockets.push(Arc::new(socket)),
                Err(e) => warn!("Failed to open SSDP socket on {}: {}", addr, e),
            }
        }

        if sockets.is_empty() {
            return Err(DiscoveryError::NetworkError(
                "No SSDP socket could be opened on the given interfaces".to_string(),
            ));
        }

        if self.config.listen_for_notify {
            match ssdp::notify_socket(&self.interface_addrs, self.config.receive_timeout) {
                Ok(socket) => sockets.push(Arc::new(socket)),
                Err(e) => debug!("NOTIFY listener unavailable, relying on search answers: {}", e),
            }
        }

        info!("SSDP engine initialized with {} socket(s)", sockets.len());
        self.sockets = sockets;
        self.shared.ready.store(true, Ordering::Release);
        self.state = EngineState::Initialized;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            EngineState::Idle | EngineState::Terminated => Err(DiscoveryError::NotReady),
            EngineState::Started => Ok(()),
            EngineState::Initialized => {
                self.shared.running.store(true, Ordering::Release);
                let sockets = self.sockets.clone();
                for (index, socket) in sockets.into_iter().enumerate() {
                    self.spawn_receiver(socket, &format!("avcp-ssdp-{}", index));
                }
                self.state = EngineState::Started;
                debug!("SSDP engine started");
                Ok(())
            }
        }
    }

    fn stop(&mut self) {
        if self.state != EngineState::Started {
            return;
        }

        self.shared.running.store(false, Ordering::Release);
        for handle in self.receivers.drain(..) {
            if handle.join().is_err() {
                warn!("SSDP receive thread panicked");
            }
        }
        self.state = EngineState::Initialized;
        debug!("SSDP engine stopped");
    }

    fn terminate(&mut self) {
        if !self.is_ready() {
            return;
        }

        self.stop();
        self.shared.ready.store(false, Ordering::Release);
        self.subscriber.unsubscribe_all();
        self.sockets.clear();
        self.shared.devices.lock().clear();
        self.shared.pending.lock().clear();
        self.state = EngineState::Terminated;
        info!("SSDP engine terminated");
    }

    fn search(&self, target: Option<&str>) -> Result<()> {
        if !self.is_ready() {
            return Err(DiscoveryError::NotReady);
        }

        let target = target.unwrap_or(SEARCH_ALL);
        let request = ssdp::build_msearch(target, self.config.mx, &self.config.user_agent);

        let mut sent = 0;
        let mut last_error = None;
        for socket in &self.sockets {
            match ssdp::send_msearch(socket, &request) {
                Ok(()) => sent += 1,
                Err(e) => last_error = Some(e),
            }
        }

        trace!("M-SEARCH {} sent on {} socket(s)", target, sent);
        match (sent, last_error) {
            (0, Some(e)) => Err(DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e))),
            _ => Ok(()),
        }
    }

    fn try_add_pinned_device(&self, location: &str) {
        if !self.shared.ready.load(Ordering::Acquire) {
            debug!("Ignoring pinned device {} on an uninitialized engine", location);
            return;
        }

        let shared = Arc::clone(&self.shared);
        let location = location.to_string();
        if let Err(e) = thread::Builder::new()
            .name("avcp-pinned".to_string())
            .spawn(move || shared.load_pinned(&location))
        {
            warn!("Failed to spawn pinned device loader: {}", e);
        }
    }

    fn set_icon_filter(&mut self, filter: Arc<dyn IconFilter>) {
        *self.shared.icon_filter.write() = filter;
    }

    fn add_listener(&mut self, listener: EngineListener) -> ListenerId {
        let id = ListenerId::new(self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().push((id, listener));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.shared.listeners.write().retain(|(listener_id, _)| *listener_id != id);
    }

    fn subscriber(&self) -> Arc<dyn EventSubscriber> {
        Arc::clone(&self.subscriber) as Arc<dyn EventSubscriber>
    }
}

impl Drop for SsdpEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl Shared {
    fn handle_message(&self, message: SsdpMessage) {
        let udn = message.udn().to_string();
        match message {
            SsdpMessage::ByeBye { .. } => {
                let removed = self.devices.lock().remove(&udn);
                if let Some(tracked) = removed {
                    debug!("Device left: {} ({})", tracked.device.friendly_name, udn);
                    self.emit(DeviceEvent::Lost(tracked.device));
                }
            }
            SsdpMessage::Alive { location, max_age, .. }
            | SsdpMessage::SearchResponse { location, max_age, .. } => {
                self.observe(&udn, &location, max_age);
            }
        }
    }

    fn observe(&self, udn: &str, location: &str, max_age: u32) {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(max_age));

        if let Some(tracked) = self.devices.lock().get_mut(udn) {
            if tracked.expires_at.is_some() {
                tracked.expires_at = Some(expires_at);
            }
            return;
        }

        if !self.pending.lock().insert(udn.to_string()) {
            return;
        }

        let loaded = self.load_device(location, false);
        self.pending.lock().remove(udn);

        match loaded {
            Ok(device) => self.insert(device, Some(expires_at)),
            Err(e) => debug!("Skipping device {} at {}: {}", udn, location, e),
        }
    }

    fn load_pinned(&self, location: &str) {
        let known = self
            .devices
            .lock()
            .values()
            .any(|tracked| tracked.device.location == location);
        if known {
            return;
        }

        match self.load_device(location, true) {
            Ok(device) => self.insert(device, None),
            Err(e) => debug!("Pinned device at {} unreachable: {}", location, e),
        }
    }

    fn load_device(&self, location: &str, pinned: bool) -> Result<Device> {
        let xml = self
            .http
            .get(location)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to fetch device description: {}", e)))?;

        let filter = self.icon_filter.read().clone();
        Root::from_xml(&xml)?.into_device(location, filter.as_ref(), pinned)
    }

    fn insert(&self, device: Device, expires_at: Option<Instant>) {
        if !self.ready.load(Ordering::Acquire) {
            return;
        }

        let device = Arc::new(device);
        {
            let mut devices = self.devices.lock();
            if devices.contains_key(&device.udn) {
                return;
            }
            devices.insert(
                device.udn.clone(),
                Tracked {
                    device: Arc::clone(&device),
                    expires_at,
                },
            );
        }

        debug!("Device found: {} ({})", device.friendly_name, device.udn);
        self.emit(DeviceEvent::Found(device));
    }

    fn expire_stale(&self) {
        let now = Instant::now();
        let expired: Vec<Arc<Device>> = {
            let mut devices = self.devices.lock();
            let udns: Vec<String> = devices
                .iter()
                .filter(|(_, tracked)| tracked.expires_at.is_some_and(|at| at <= now))
                .map(|(udn, _)| udn.clone())
                .collect();
            udns.iter()
                .filter_map(|udn| devices.remove(udn))
                .map(|tracked| tracked.device)
                .collect()
        };

        for device in expired {
            debug!("Device expired: {} ({})", device.friendly_name, device.udn);
            self.emit(DeviceEvent::Lost(device));
        }
    }

    fn emit(&self, event: DeviceEvent) {
        let listeners: Vec<EngineListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }

        self.dispatcher.dispatch(Box::new(move || {
            for listener in &listeners {
                listener(&event);
            }
        }));
    }
}

fn receive_loop(shared: Arc<Shared>, socket: Arc<UdpSocket>, pause: Duration) {
    let mut buffer = [0u8; 8192];
    while shared.running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buffer) {
            Ok((size, from)) => {
                let text = String::from_utf8_lossy(&buffer[..size]);
                match ssdp::parse_message(&text) {
                    Some(message) => shared.handle_message(message),
                    None => trace!("Ignoring SSDP datagram from {}", from),
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("SSDP receive error: {}", e);
                thread::sleep(pause);
            }
        }
        shared.expire_stale();
    }
}
