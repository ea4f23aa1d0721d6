//! # cascade-network
//!
//! Network subsystem for a cascade node.
//!
//! This crate provides:
//! - A TCP listener bound to an ephemeral loopback port by default
//! - Protocol handshake with version and network id checks
//! - Block and transaction relay to connected peers
//! - Persisted known-peer addresses
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+
//! |      Network      |  <- Shared handle
//! +-------------------+
//!          |
//! +--------+--------+
//! | Accept | Connect|  <- TCP connections
//! +--------+--------+
//!          |
//! +-------------------+
//! |   PeerManager     |  <- Peer tracking
//! +-------------------+
//! ```
//!
//! The network is a leaf: it depends on nothing else in the node and has no
//! outgoing change signal.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod peer;
mod service;
mod types;

pub use error::{NetworkError, NetworkResult};
pub use peer::{PeerConnection, PeerInfo, PeerManager, PeerState};
pub use service::{Network, NetworkConfig};
pub use types::{Handshake, Message, MessageType, PeerId};
