//! Transaction pool error types

use cascade_types::{Amount, H256};
use thiserror::Error;

/// Transaction pool errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxPoolError {
    /// Transaction already in the pool
    #[error("transaction already exists: {0:?}")]
    AlreadyExists(H256),

    /// Transaction already confirmed on chain
    #[error("transaction already confirmed: {0:?}")]
    AlreadyConfirmed(H256),

    /// Transfers must move a non-zero amount
    #[error("zero amount")]
    ZeroAmount,

    /// Fee below the pool minimum
    #[error("fee too low: {fee} < {min}")]
    FeeTooLow {
        /// Offered fee
        fee: Amount,
        /// Pool minimum
        min: Amount,
    },

    /// Pool is full
    #[error("pool is full ({0} transactions)")]
    PoolFull(usize),

    /// Invalid pool configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for transaction pool operations
pub type TxPoolResult<T> = Result<T, TxPoolError>;
