//! Wallet error types

use cascade_consensus::ConsensusError;
use cascade_storage::StorageError;
use cascade_txpool::TxPoolError;
use cascade_types::Amount;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Address store error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chain read failed
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Pool refused a transaction
    #[error("transaction pool error: {0}")]
    Pool(#[from] TxPoolError),

    /// Not enough spendable coins
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount plus fee
        needed: Amount,
        /// Confirmed balance minus pooled outgoing
        available: Amount,
    },

    /// Stored address could not be decoded
    #[error("corrupt address record: {0}")]
    CorruptAddress(String),
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
