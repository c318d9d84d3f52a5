//! Periodic search loop
//!
//! A tokio task that asks the lifecycle worker for one search tick, then
//! sleeps for the search interval, until its cancellation token fires. The
//! sleep is interrupted by cancellation; a tick already handed to the worker
//! is waited for.

use std::sync::mpsc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::worker::Command;

/// Handle to a running search loop
pub(crate) struct SearchLoop {
    cancel: CancellationToken,
    /// Disconnects when the task finishes
    finished: mpsc::Receiver<()>,
    task: JoinHandle<()>,
}

impl SearchLoop {
    pub(crate) fn spawn(runtime: &Handle, commands: mpsc::Sender<Command>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (finished_tx, finished) = mpsc::channel::<()>();
        let token = cancel.clone();

        let task = runtime.spawn(async move {
            let _finished = finished_tx;
            run_search_loop(commands, interval, token).await;
        });

        debug!("Search loop started (interval {:?})", interval);
        Self { cancel, finished, task }
    }

    /// Cancel the loop and wait up to `timeout` for it to finish.
    ///
    /// Returns `false` if the loop had to be aborted. Ticks still queued at
    /// the worker see the cancelled token and do nothing.
    pub(crate) fn stop(self, timeout: Duration) -> bool {
        self.cancel.cancel();
        match self.finished.recv_timeout(timeout) {
            Err(mpsc::RecvTimeoutError::Disconnected) | Ok(()) => {
                debug!("Search loop stopped");
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("Search loop did not stop within {:?}, aborting", timeout);
                self.task.abort();
                false
            }
        }
    }
}

async fn run_search_loop(commands: mpsc::Sender<Command>, interval: Duration, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tick = Command::SearchTick {
            cancel: cancel.clone(),
            reply: reply_tx,
        };
        if commands.send(tick).is_err() || reply_rx.await.is_err() {
            debug!("Lifecycle worker gone, ending search loop");
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Answers ticks on a plain thread, counting the ones not cancelled
    fn tick_counter() -> (mpsc::Sender<Command>, Arc<AtomicUsize>, thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<Command>();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let handle = thread::spawn(move || {
            for command in rx.iter() {
                if let Command::SearchTick { cancel, reply } = command {
                    if !cancel.is_cancelled() {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = reply.send(());
                }
            }
        });
        (tx, ticks, handle)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_tick_is_immediate_and_stop_ends_ticks() {
        let rt = runtime();
        let (tx, ticks, worker) = tick_counter();

        let search = SearchLoop::spawn(rt.handle(), tx, Duration::from_secs(60));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        // Interrupts the 60 s sleep
        assert!(search.stop(Duration::from_secs(2)));
        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);

        drop(rt);
        worker.join().unwrap();
    }

    #[test]
    fn test_ticks_repeat_at_interval() {
        let rt = runtime();
        let (tx, ticks, _worker) = tick_counter();

        let search = SearchLoop::spawn(rt.handle(), tx, Duration::from_millis(50));
        thread::sleep(Duration::from_millis(400));
        assert!(search.stop(Duration::from_secs(2)));

        let count = ticks.load(Ordering::SeqCst);
        assert!(count >= 3, "expected several ticks, got {}", count);
        assert!(count <= 10, "expected at most one tick per interval, got {}", count);
    }

    #[test]
    fn test_loop_ends_when_worker_is_gone() {
        let rt = runtime();
        let (tx, rx) = mpsc::channel::<Command>();
        drop(rx);

        let search = SearchLoop::spawn(rt.handle(), tx, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(100));
        assert!(search.stop(Duration::from_millis(500)));
    }
}
