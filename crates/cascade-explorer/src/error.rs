//! Explorer error types

use cascade_consensus::ConsensusError;
use thiserror::Error;

/// Explorer errors
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Reading the chain failed
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// The chain has no genesis block
    #[error("missing genesis block")]
    MissingGenesis,
}

/// Result type for explorer operations
pub type ExplorerResult<T> = Result<T, ExplorerError>;
