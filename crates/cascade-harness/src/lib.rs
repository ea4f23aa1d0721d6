//! # cascade-harness
//!
//! Deterministic test harness for a multi-subsystem cascade node.
//!
//! ## Design
//!
//! 1. **Composed**: [`compose`] builds network, consensus, pool, wallet,
//!    miner and explorer in dependency order, each from the instances
//!    built before it
//! 2. **Settled**: [`PropagationBarrier`] blocks until a change has
//!    cascaded through every subsystem on its path
//! 3. **Isolated**: [`NodeTester`] gives each test its own scratch
//!    directory and an ephemeral bind address
//!
//! The barrier has no timeout of its own. Wrap every wait in
//! `tokio::time::timeout`.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tester = NodeTester::new("mining").await?;
//! tester.node().miner().mine_block().await?;
//! timeout(Duration::from_secs(10), tester.node_mut().await_consensus_propagation()).await?;
//! assert_eq!(tester.node().consensus().height(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod barrier;
mod composer;
mod config;
mod tester;

pub use barrier::{PropagationBarrier, CONSENSUS_PROPAGATION_ORDER, POOL_PROPAGATION_ORDER};
pub use composer::{compose, NodeComposition, Role};
pub use config::{ComposeConfig, CONSENSUS_DIR, NETWORK_DIR, WALLET_DIR};
pub use tester::NodeTester;

use cascade_consensus::ConsensusError;
use cascade_explorer::ExplorerError;
use cascade_miner::MinerError;
use cascade_network::NetworkError;
use cascade_txpool::TxPoolError;
use cascade_wallet::WalletError;

/// Harness result
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Harness errors
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Network failed
    #[error("network: {0}")]
    Network(#[from] NetworkError),

    /// Consensus failed
    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),

    /// Transaction pool failed
    #[error("transaction pool: {0}")]
    TransactionPool(#[from] TxPoolError),

    /// Wallet failed
    #[error("wallet: {0}")]
    Wallet(#[from] WalletError),

    /// Miner failed
    #[error("miner: {0}")]
    Miner(#[from] MinerError),

    /// Explorer failed
    #[error("explorer: {0}")]
    Explorer(#[from] ExplorerError),

    /// Scratch directory error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl HarnessError {
    /// The subsystem this error came from, if any
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Network(_) => Some(Role::Network),
            Self::Consensus(_) => Some(Role::Consensus),
            Self::TransactionPool(_) => Some(Role::TransactionPool),
            Self::Wallet(_) => Some(Role::Wallet),
            Self::Miner(_) => Some(Role::Miner),
            Self::Explorer(_) => Some(Role::Explorer),
            Self::Io(_) | Self::Config(_) => None,
        }
    }
}

/// Install a `tracing` fmt subscriber writing through the test harness.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_roles() {
        let err: HarnessError = TxPoolError::ZeroAmount.into();
        assert_eq!(err.role(), Some(Role::TransactionPool));
        assert!(format!("{}", err).starts_with("transaction pool:"));

        let err = HarnessError::Config("bad".into());
        assert_eq!(err.role(), None);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
