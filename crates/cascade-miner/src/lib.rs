//! # cascade-miner
//!
//! Miner subsystem. Keeps a block template on the current tip filled from
//! the transaction pool, and turns it into a block on demand.
//!
//! There is no proof of work: `mine_block` builds and submits immediately.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod miner;

pub use error::{MinerError, MinerResult};
pub use miner::{Miner, MinerConfig};
