//! # cascade-txpool
//!
//! Transaction pool subsystem.
//!
//! This crate provides:
//! - Admission of unconfirmed transactions with fee and size limits
//! - Pruning of transactions confirmed by new blocks
//! - Fee-ordered selection for block templates
//!
//! ## Architecture
//!
//! ```text
//! ConsensusSet ──signal──> [reactor] prune confirmed ──publish──> Wallet, Miner
//! accept_transaction ──────────────────────────────────publish──> Wallet, Miner
//! ```
//!
//! The pool publishes after every consensus change it processes, even when
//! nothing was pruned, so that downstream subsystems always see the new tip.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod pool;

pub use error::{TxPoolError, TxPoolResult};
pub use pool::{PoolConfig, PooledTransaction, TransactionPool};
