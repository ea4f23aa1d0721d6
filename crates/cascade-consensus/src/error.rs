//! Consensus error types

use cascade_storage::StorageError;
use cascade_types::{BlockHeight, H256};
use thiserror::Error;

/// Consensus errors
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Block already part of the chain
    #[error("block already known: {0}")]
    BlockKnown(H256),

    /// Block does not build on the current tip
    #[error("unknown parent {parent}, tip is {tip}")]
    UnknownParent {
        /// Parent named by the block
        parent: H256,
        /// Current tip
        tip: H256,
    },

    /// Block height is not tip height + 1
    #[error("wrong height: expected {expected}, got {got}")]
    WrongHeight {
        /// Expected height
        expected: BlockHeight,
        /// Height carried by the block
        got: BlockHeight,
    },

    /// Stored chain starts from a different genesis block
    #[error("genesis mismatch: stored {0}")]
    GenesisMismatch(H256),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
