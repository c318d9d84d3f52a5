//! Lifecycle worker thread
//!
//! The worker is the only owner of the [`ControlPointManager`]. Every manager
//! operation reaches it as a [`Command`] over a std channel, so teardown,
//! restart and search probes are serialized without a lock around the
//! manager.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ControlPointError, Result};
use crate::manager::ControlPointManager;
use crate::platform::{Notice, NoticeHandler};
use crate::reachability::NetworkReachability;
use crate::selection::{Selection, SubscriberSlot};

/// Work run on the worker between teardown and re-initialization
pub type RestartCallback = Box<dyn FnOnce() + Send + 'static>;

/// Commands sent to the lifecycle worker
pub enum Command {
    /// Bring the manager to `desired` if interfaces allow it
    Reconcile { desired: bool, reply: mpsc::Sender<bool> },
    /// Re-check reachability, reconcile and report a missing network.
    ///
    /// Signals without a reply come from the connectivity monitor and are
    /// dropped while the coordinator is terminated.
    ConnectivityChanged { reply: Option<mpsc::Sender<bool>> },
    /// Tear down, run the callback, bring the manager back up
    Restart { callback: RestartCallback, reply: mpsc::Sender<bool> },
    /// Stop and terminate the manager
    Terminate { reply: mpsc::Sender<()> },
    /// One search-loop iteration; skipped once `cancel` is cancelled
    SearchTick {
        cancel: CancellationToken,
        reply: oneshot::Sender<()>,
    },
    /// Add a device by fixed description URL
    AddPinned { location: String, reply: mpsc::Sender<Result<()>> },
    /// Report whether the manager is initialized
    IsActive { reply: mpsc::Sender<bool> },
    /// Terminate the manager and exit
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reconcile { desired, .. } => write!(f, "Reconcile({})", desired),
            Command::ConnectivityChanged { .. } => f.write_str("ConnectivityChanged"),
            Command::Restart { .. } => f.write_str("Restart"),
            Command::Terminate { .. } => f.write_str("Terminate"),
            Command::SearchTick { .. } => f.write_str("SearchTick"),
            Command::AddPinned { location, .. } => write!(f, "AddPinned({})", location),
            Command::IsActive { .. } => f.write_str("IsActive"),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Everything the worker needs to drive the manager
pub(crate) struct Lifecycle {
    pub(crate) manager: ControlPointManager,
    pub(crate) reachability: Arc<dyn NetworkReachability>,
    pub(crate) notices: NoticeHandler,
    pub(crate) pinned_locations: Vec<String>,
    pub(crate) subscriber: SubscriberSlot,
    /// Selections re-subscribed on every fresh engine
    pub(crate) selections: Vec<Arc<Selection>>,
    pub(crate) accepting_signals: Arc<AtomicBool>,
}

impl Lifecycle {
    /// Returns whether the manager ended up initialized and started
    pub(crate) fn initialize_or_terminate(&mut self, desired: bool) -> bool {
        if desired {
            let interfaces = self.reachability.available_interfaces();
            if interfaces.is_empty() {
                debug!("No usable interface, deactivating control point");
            } else {
                match self
                    .manager
                    .initialize(&interfaces)
                    .and_then(|()| self.manager.start())
                {
                    Ok(()) => {
                        for selection in &self.selections {
                            selection.resubscribe(&self.subscriber);
                        }
                        return true;
                    }
                    Err(e) => warn!("Failed to activate control point: {}", e),
                }
            }
        }

        self.manager.stop();
        self.manager.terminate();
        false
    }

    fn connectivity_changed(&mut self) -> bool {
        let available = self.reachability.has_available_interface();
        let active = self.initialize_or_terminate(available);
        if !active {
            (self.notices)(Notice::NoNetwork);
        }
        active
    }

    fn restart(&mut self, callback: RestartCallback) -> bool {
        if !self.reachability.has_available_interface() {
            (self.notices)(Notice::NoNetwork);
            return false;
        }

        self.manager.stop();
        self.manager.terminate();
        callback();
        self.initialize_or_terminate(true)
    }

    fn search_tick(&mut self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            trace!("Search loop cancelled, dropping tick");
            return;
        }
        if !self.manager.is_initialized() {
            trace!("Control point not initialized, skipping search tick");
            return;
        }

        for location in &self.pinned_locations {
            if let Err(e) = self.manager.add_pinned_device(location) {
                debug!("Failed to add pinned device {}: {}", location, e);
            }
        }

        if let Err(e) = self.manager.search() {
            debug!("Search probe failed: {}", e);
        }
    }

    fn terminate(&mut self) {
        self.manager.stop();
        self.manager.terminate();
    }
}

/// Spawns the lifecycle worker thread
pub(crate) fn spawn_lifecycle_worker(
    mut lifecycle: Lifecycle,
    command_rx: mpsc::Receiver<Command>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("avcp-lifecycle".to_string())
        .spawn(move || {
            info!("Lifecycle worker started");

            for command in command_rx.iter() {
                trace!("Lifecycle worker: {:?}", command);
                match command {
                    Command::Reconcile { desired, reply } => {
                        let _ = reply.send(lifecycle.initialize_or_terminate(desired));
                    }
                    Command::ConnectivityChanged { reply: Some(reply) } => {
                        let _ = reply.send(lifecycle.connectivity_changed());
                    }
                    Command::ConnectivityChanged { reply: None } => {
                        if lifecycle.accepting_signals.load(Ordering::SeqCst) {
                            lifecycle.connectivity_changed();
                        } else {
                            debug!("Connectivity signal while terminated, ignoring");
                        }
                    }
                    Command::Restart { callback, reply } => {
                        let _ = reply.send(lifecycle.restart(callback));
                    }
                    Command::Terminate { reply } => {
                        lifecycle.terminate();
                        let _ = reply.send(());
                    }
                    Command::SearchTick { cancel, reply } => {
                        lifecycle.search_tick(&cancel);
                        let _ = reply.send(());
                    }
                    Command::AddPinned { location, reply } => {
                        let _ = reply.send(lifecycle.manager.add_pinned_device(&location));
                    }
                    Command::IsActive { reply } => {
                        let _ = reply.send(lifecycle.manager.is_initialized());
                    }
                    Command::Shutdown => {
                        info!("Lifecycle worker received shutdown command");
                        break;
                    }
                }
            }

            lifecycle.terminate();
            info!("Lifecycle worker shut down");
        })
}

/// Send `command` built around a fresh reply channel and wait for the answer
pub(crate) fn request<T>(
    commands: &mpsc::Sender<Command>,
    build: impl FnOnce(mpsc::Sender<T>) -> Command,
) -> Result<T> {
    let (reply_tx, reply_rx) = mpsc::channel();
    commands
        .send(build(reply_tx))
        .map_err(|_| ControlPointError::WorkerDisconnected)?;
    reply_rx.recv().map_err(|_| ControlPointError::WorkerDisconnected)
}
