//! Notifier and ChangeSignal

use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

/// The publishing side was dropped and nothing is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("change signal publisher closed")]
pub struct SignalClosed;

/// Anything that hands out change signal subscriptions
pub trait Notify {
    /// Subscribe to this subsystem's change signal.
    ///
    /// The returned handle is never pending at return time.
    fn notify(&self) -> ChangeSignal;
}

/// Publishing side of a change signal
///
/// The watched value is a publish counter; subscribers only compare it
/// against the last value they consumed.
pub struct Notifier {
    tx: watch::Sender<u64>,
}

impl Notifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Mark every subscription pending. Never blocks.
    pub fn publish(&self) {
        self.tx.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// New subscription, starting with nothing pending
    pub fn subscribe(&self) -> ChangeSignal {
        let rx = self.tx.subscribe();
        let seen = *rx.borrow();
        ChangeSignal { rx, seen }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total publishes so far
    pub fn published(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("published", &self.published())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receive-only handle bound to one subsystem's change signal
pub struct ChangeSignal {
    rx: watch::Receiver<u64>,
    /// Publish counter value at the last consume
    seen: u64,
}

impl ChangeSignal {
    /// Whether a publish happened since the last consume
    pub fn is_pending(&self) -> bool {
        *self.rx.borrow() != self.seen
    }

    /// Consume the pending wakeup if there is one
    pub fn try_take(&mut self) -> bool {
        let current = *self.rx.borrow_and_update();
        if current == self.seen {
            return false;
        }
        self.seen = current;
        true
    }

    /// Wait until pending without clearing it.
    ///
    /// Fails only when the publisher is gone and nothing is pending.
    /// Cancel safe; nothing is consumed.
    pub async fn ready(&mut self) -> Result<(), SignalClosed> {
        loop {
            if *self.rx.borrow_and_update() != self.seen {
                return Ok(());
            }
            self.rx.changed().await.map_err(|_| SignalClosed)?;
        }
    }

    /// Wait until pending, then clear.
    ///
    /// Fails only when the publisher is gone and nothing is pending.
    /// Cancel safe.
    pub async fn changed(&mut self) -> Result<(), SignalClosed> {
        loop {
            if self.try_take() {
                return Ok(());
            }
            // `try_take` marked the current version seen, so this only
            // resolves on a publish that landed after it.
            self.rx.changed().await.map_err(|_| SignalClosed)?;
        }
    }

    /// Wait until pending, then clear.
    ///
    /// If the publisher is dropped while nothing is pending this never
    /// resolves; callers bound it with their own deadline.
    pub async fn wait(&mut self) {
        if self.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("seen", &self.seen)
            .field("pending", &self.is_pending())
            .finish()
    }
}
