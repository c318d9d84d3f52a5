//! Host integration points
//!
//! The coordinator needs three things from the host it runs on: a signal
//! when connectivity changes, a way to keep the network awake while it is
//! active, and a place to surface user-visible notices.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use avcp_discovery::interface::InterfaceSource;
use avcp_discovery::AddressFamily;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// User-visible notices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// No usable network; discovery is inactive
    NoNetwork,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::NoNetwork => write!(f, "No network connection available"),
        }
    }
}

/// Receives [`Notice`]s
pub type NoticeHandler = Arc<dyn Fn(Notice) + Send + Sync>;

/// Notice handler that only logs
pub fn log_notices() -> NoticeHandler {
    Arc::new(|notice| warn!("{}", notice))
}

/// Invoked when connectivity may have changed
pub type ConnectivityCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of connectivity-change signals
pub trait ConnectivityMonitor: Send + Sync {
    /// Start delivering change signals to `on_change`, replacing any
    /// previously registered callback
    fn register(&self, on_change: ConnectivityCallback);

    /// Stop delivering change signals
    fn unregister(&self);
}

/// Monitor driven by the host application
///
/// Hosts that already observe connectivity call [`ManualConnectivity::notify_changed`].
#[derive(Default)]
pub struct ManualConnectivity {
    callback: Mutex<Option<ConnectivityCallback>>,
}

impl ManualConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a change signal to the registered callback, if any
    pub fn notify_changed(&self) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn is_registered(&self) -> bool {
        self.callback.lock().is_some()
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn register(&self, on_change: ConnectivityCallback) {
        *self.callback.lock() = Some(on_change);
    }

    fn unregister(&self) {
        self.callback.lock().take();
    }
}

struct Poller {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Monitor that polls the host's interface list
///
/// Signals a change whenever the set of usable interfaces and their
/// addresses differs from the previous poll.
pub struct InterfacePollingMonitor {
    source: Arc<dyn InterfaceSource>,
    family: AddressFamily,
    interval: Duration,
    poller: Mutex<Option<Poller>>,
}

impl InterfacePollingMonitor {
    pub fn new(source: Arc<dyn InterfaceSource>, family: AddressFamily, interval: Duration) -> Self {
        Self {
            source,
            family,
            interval,
            poller: Mutex::new(None),
        }
    }
}

/// Usable interfaces and their addresses, in a comparable form
fn fingerprint(source: &dyn InterfaceSource, family: AddressFamily) -> Vec<String> {
    let mut entries: Vec<String> = source
        .interfaces()
        .into_iter()
        .filter(|iface| iface.is_usable(family))
        .flat_map(|iface| {
            let name = iface.name;
            iface
                .addresses
                .into_iter()
                .map(move |addr| format!("{}/{}", name, addr))
        })
        .collect();
    entries.sort();
    entries
}

impl ConnectivityMonitor for InterfacePollingMonitor {
    fn register(&self, on_change: ConnectivityCallback) {
        self.unregister();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let source = Arc::clone(&self.source);
        let family = self.family;
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name("avcp-connectivity".to_string())
            .spawn(move || {
                let mut last = fingerprint(source.as_ref(), family);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let current = fingerprint(source.as_ref(), family);
                            if current != last {
                                info!("Network interfaces changed: {:?}", current);
                                last = current;
                                on_change();
                            }
                        }
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Connectivity poller stopped");
            });

        match spawned {
            Ok(handle) => *self.poller.lock() = Some(Poller { stop_tx, handle }),
            Err(e) => warn!("Failed to spawn connectivity poller: {}", e),
        }
    }

    fn unregister(&self) {
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            let _ = poller.stop_tx.send(());
            if poller.handle.join().is_err() {
                warn!("Connectivity poller panicked");
            }
        }
    }
}

impl Drop for InterfacePollingMonitor {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Keeps the host's network awake while discovery is active
pub trait KeepAlive: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Reference-counted keep-alive without a platform lock behind it
///
/// Hosts with a real wake or Wi-Fi lock wrap it in their own [`KeepAlive`].
#[derive(Debug, Default)]
pub struct RefCountedKeepAlive {
    holders: AtomicUsize,
}

impl RefCountedKeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.holders() > 0
    }

    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }
}

impl KeepAlive for RefCountedKeepAlive {
    fn acquire(&self) {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Network keep-alive acquired ({} holder(s))", holders);
    }

    fn release(&self) {
        let released = self
            .holders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match released {
            Ok(previous) => debug!("Network keep-alive released ({} holder(s))", previous - 1),
            Err(_) => warn!("Network keep-alive released more often than acquired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avcp_discovery::NetworkInterface;

    #[test]
    fn test_keep_alive_is_reference_counted() {
        let keep_alive = RefCountedKeepAlive::new();
        keep_alive.acquire();
        keep_alive.acquire();
        keep_alive.release();
        assert!(keep_alive.is_held());
        keep_alive.release();
        assert!(!keep_alive.is_held());
        // Unbalanced release does not underflow
        keep_alive.release();
        assert_eq!(keep_alive.holders(), 0);
    }

    #[test]
    fn test_manual_connectivity_delivers_until_unregistered() {
        let monitor = ManualConnectivity::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        monitor.register(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.notify_changed();
        monitor.unregister();
        monitor.notify_changed();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_registered());
    }

    struct Switchable(Mutex<Vec<NetworkInterface>>);

    impl InterfaceSource for Switchable {
        fn interfaces(&self) -> Vec<NetworkInterface> {
            self.0.lock().clone()
        }
    }

    #[test]
    fn test_polling_monitor_signals_interface_change() {
        let source = Arc::new(Switchable(Mutex::new(Vec::new())));
        let monitor = InterfacePollingMonitor::new(
            Arc::clone(&source) as Arc<dyn InterfaceSource>,
            AddressFamily::Ipv4,
            Duration::from_millis(20),
        );

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        monitor.register(Arc::new(move || {
            let _ = tx.lock().send(());
        }));

        source.0.lock().push(NetworkInterface {
            name: "eth0".to_string(),
            is_up: true,
            is_multicast: true,
            is_loopback: false,
            addresses: vec!["192.168.1.10".parse().unwrap()],
        });

        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        monitor.unregister();
    }

    #[test]
    fn test_notice_display() {
        assert_eq!(Notice::NoNetwork.to_string(), "No network connection available");
    }
}
