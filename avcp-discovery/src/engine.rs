//! The discovery engine contract.
//!
//! A control point drives one [`DiscoveryEngine`] at a time, built by an
//! [`EngineFactory`] for a chosen set of interfaces. Engines report devices
//! to registered listeners through a [`Dispatcher`], which decides on which
//! thread the callbacks run.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::icon::IconFilter;
use crate::interface::NetworkInterface;
use crate::{Device, DeviceEvent};

/// Unit of work handed to a [`Dispatcher`]
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Callback receiving device events from an engine
pub type EngineListener = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Handle returned by [`DiscoveryEngine::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Decides where engine callbacks run
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: Task);
}

/// Runs callbacks immediately on the engine's own thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: Task) {
        task();
    }
}

/// Queues callbacks for an application-owned loop
///
/// Pair it with the [`DispatchQueue`] returned by [`QueueDispatcher::new`]
/// and drain the queue from the thread that should observe device events.
pub struct QueueDispatcher {
    tx: mpsc::Sender<Task>,
}

impl QueueDispatcher {
    pub fn new() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, DispatchQueue { rx })
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, task: Task) {
        if self.tx.send(task).is_err() {
            tracing::debug!("Dispatch queue dropped, discarding engine callback");
        }
    }
}

/// Receiving end of a [`QueueDispatcher`]
pub struct DispatchQueue {
    rx: mpsc::Receiver<Task>,
}

impl DispatchQueue {
    /// Run every queued callback without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Run callbacks as they arrive until `timeout` has elapsed
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut count = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return count;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(task) => {
                    task();
                    count += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => return count,
                Err(mpsc::RecvTimeoutError::Disconnected) => return count,
            }
        }
    }
}

/// GENA event subscriptions on a device's evented services
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, device: &Device) -> Result<()>;
    fn unsubscribe(&self, device: &Device) -> Result<()>;
}

/// An SSDP engine bound to a fixed set of interfaces.
///
/// Lifecycle: `initialize` prepares sockets, `start` begins receiving
/// discovery traffic, `stop` pauses it, `terminate` releases everything.
pub trait DiscoveryEngine: Send {
    fn initialize(&mut self) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn terminate(&mut self);

    /// Send one search probe. `None` searches for everything.
    fn search(&self, target: Option<&str>) -> Result<()>;

    /// Treat the device described at `location` as present regardless of
    /// discovery traffic. Failures to reach it are logged, never returned.
    fn try_add_pinned_device(&self, location: &str);

    fn set_icon_filter(&mut self, filter: Arc<dyn IconFilter>);

    fn add_listener(&mut self, listener: EngineListener) -> ListenerId;

    fn remove_listener(&mut self, id: ListenerId);

    /// Subscription handle usable without holding the engine
    fn subscriber(&self) -> Arc<dyn EventSubscriber>;
}

/// Builds engines for a set of interfaces
pub trait EngineFactory: Send + Sync {
    fn build(
        &self,
        interfaces: &[NetworkInterface],
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Box<dyn DiscoveryEngine>>;
}
