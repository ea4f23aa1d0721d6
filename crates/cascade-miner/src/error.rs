//! Miner error types

use cascade_consensus::ConsensusError;
use thiserror::Error;

/// Miner errors
#[derive(Debug, Error)]
pub enum MinerError {
    /// Consensus refused the mined block
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Invalid miner configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for miner operations
pub type MinerResult<T> = Result<T, MinerError>;
