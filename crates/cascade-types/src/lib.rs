//! # cascade-types
//!
//! Ledger types shared by every cascade subsystem.
//!
//! The subsystems only need enough structure to move value around and to
//! link blocks into a chain: hashes, addresses, transfers and blocks.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod block;
mod hash;
mod transaction;

pub use address::{Address, AddressError};
pub use block::{Block, BlockHeader};
pub use hash::{keccak256, HashError, H256};
pub use transaction::Transaction;

/// Block height type
pub type BlockHeight = u64;

/// Amount of coins
pub type Amount = u64;

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
