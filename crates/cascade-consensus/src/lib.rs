//! # cascade-consensus
//!
//! Consensus subsystem: owns the chain, accepts blocks that extend the tip,
//! and announces every accepted block on its change signal.
//!
//! Rule validation is limited to linkage: a block must be new, build on the
//! current tip and carry the next height.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod consensus;
mod error;

pub use consensus::ConsensusSet;
pub use error::{ConsensusError, ConsensusResult};
