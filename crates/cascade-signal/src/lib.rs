//! # cascade-signal
//!
//! Change signals: the only channel a cascade subsystem uses to announce
//! that it finished reacting to new input.
//!
//! ## Semantics
//!
//! - A [`Notifier`] belongs to the publishing subsystem. `publish()` never
//!   blocks and never fails.
//! - Each [`ChangeSignal`] is an independent single-slot subscription.
//!   Any number of publishes before a consume coalesce into one pending
//!   wakeup; consuming clears the slot.
//! - A [`Reactor`] drives a downstream subsystem: one reaction per drained
//!   upstream wakeup, until stopped.
//!
//! ```text
//!  Notifier ──publish──> [slot] ChangeSignal (consensus -> txpool)
//!                  └───> [slot] ChangeSignal (consensus -> explorer)
//!                  └───> [slot] ChangeSignal (consensus -> test driver)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod reactor;
mod signal;

pub use reactor::Reactor;
pub use signal::{ChangeSignal, Notifier, Notify, SignalClosed};
