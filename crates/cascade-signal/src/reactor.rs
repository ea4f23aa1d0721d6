//! Downstream worker driven by an upstream change signal

use crate::signal::{ChangeSignal, SignalClosed};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A task that runs `react` once per drained upstream wakeup.
///
/// Stops when [`Reactor::stop`] is called, when the `Reactor` is dropped,
/// or when the upstream publisher goes away.
pub struct Reactor {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    /// Spawn onto the current tokio runtime.
    ///
    /// Subscribe `upstream` before any state the reaction reads is
    /// snapshotted, so no upstream publish can fall between the two.
    pub fn spawn<F>(name: &'static str, mut upstream: ChangeSignal, mut react: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            debug!(reactor = name, "reactor started");
            loop {
                tokio::select! {
                    biased;
                    // Also resolves when the sender is dropped with the Reactor.
                    _ = stop.changed() => break,
                    changed = upstream.changed() => match changed {
                        Ok(()) => react(),
                        Err(SignalClosed) => {
                            debug!(reactor = name, "upstream closed");
                            break;
                        }
                    },
                }
            }
            debug!(reactor = name, "reactor stopped");
        });

        Self {
            name,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Reactor name, as it appears in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop after its current reaction
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Wait for the task to exit. Does not stop it.
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(reactor = self.name, "reactor task failed: {}", e);
            }
        }
    }

    /// Stop and wait
    pub async fn close(&self) {
        self.stop();
        self.join().await;
    }
}
