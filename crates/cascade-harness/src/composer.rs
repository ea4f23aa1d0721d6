//! Node composer

use crate::barrier::PropagationBarrier;
use crate::config::ComposeConfig;
use crate::HarnessResult;
use cascade_consensus::ConsensusSet;
use cascade_explorer::Explorer;
use cascade_metrics::{Metrics, MetricsSnapshot};
use cascade_miner::Miner;
use cascade_network::Network;
use cascade_signal::{ChangeSignal, Notify};
use cascade_txpool::TransactionPool;
use cascade_wallet::Wallet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A subsystem's place in the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Peer connections and relay
    Network,
    /// Chain tip and block acceptance
    Consensus,
    /// Unconfirmed transactions
    TransactionPool,
    /// Addresses and balances
    Wallet,
    /// Block templates and mining
    Miner,
    /// Read model over consensus
    Explorer,
}

impl Role {
    /// Every role, dependencies first
    pub const CONSTRUCTION_ORDER: [Role; 6] = [
        Role::Network,
        Role::Consensus,
        Role::TransactionPool,
        Role::Wallet,
        Role::Miner,
        Role::Explorer,
    ];

    /// Name used in logs and metric keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Network => "network",
            Role::Consensus => "consensus",
            Role::TransactionPool => "transaction-pool",
            Role::Wallet => "wallet",
            Role::Miner => "miner",
            Role::Explorer => "explorer",
        }
    }

    /// Roles this one is constructed from
    pub fn dependencies(&self) -> &'static [Role] {
        match self {
            Role::Network => &[],
            Role::Consensus => &[Role::Network],
            Role::TransactionPool => &[Role::Consensus, Role::Network],
            Role::Wallet => &[Role::Consensus, Role::TransactionPool],
            Role::Miner => &[Role::Consensus, Role::TransactionPool, Role::Wallet],
            Role::Explorer => &[Role::Consensus],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build every subsystem in [`Role::CONSTRUCTION_ORDER`].
///
/// The first constructor error aborts composition and is returned. There is
/// no rollback step: the subsystems built before the failure are dropped
/// along with the partial composition when the `Err` is returned, and their
/// `Drop` impls stop the reactors and the network accept loop. Nothing else
/// is torn down. Their storage directories stay under `config.root` for the
/// caller to release.
pub async fn compose(config: ComposeConfig) -> HarnessResult<NodeComposition> {
    std::fs::create_dir_all(&config.root)?;

    let network = Network::bind(config.network_config(), config.network_dir()).await?;
    debug!(role = %Role::Network, addr = %network.local_addr(), "constructed");

    let consensus = ConsensusSet::new(network.clone(), config.consensus_dir())?;
    debug!(role = %Role::Consensus, height = consensus.height(), "constructed");

    let tpool = TransactionPool::with_config(consensus.clone(), network.clone(), config.pool.clone())?;
    debug!(role = %Role::TransactionPool, "constructed");

    let wallet = Wallet::new(consensus.clone(), tpool.clone(), config.wallet_dir())?;
    debug!(role = %Role::Wallet, address = %wallet.address(), "constructed");

    let miner = Miner::with_config(
        consensus.clone(),
        tpool.clone(),
        wallet.clone(),
        config.miner.clone(),
    )?;
    debug!(role = %Role::Miner, "constructed");

    let explorer = Explorer::new(consensus.clone())?;
    debug!(role = %Role::Explorer, "constructed");

    let metrics = Arc::new(Metrics::new());
    let barrier = PropagationBarrier::with_metrics(
        consensus.notify(),
        tpool.notify(),
        miner.notify(),
        wallet.notify(),
        metrics.clone(),
    );

    info!(
        root = %config.root.display(),
        addr = %network.local_addr(),
        "Node composed"
    );

    Ok(NodeComposition {
        config,
        network,
        consensus,
        tpool,
        wallet,
        miner,
        explorer,
        barrier,
        metrics,
    })
}

/// The wired subsystems of one node, plus the barrier over their signals
pub struct NodeComposition {
    config: ComposeConfig,
    network: Arc<Network>,
    consensus: Arc<ConsensusSet>,
    tpool: Arc<TransactionPool>,
    wallet: Arc<Wallet>,
    miner: Arc<Miner>,
    explorer: Arc<Explorer>,
    barrier: PropagationBarrier,
    metrics: Arc<Metrics>,
}

impl NodeComposition {
    /// Configuration this node was composed from
    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Network subsystem
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Consensus subsystem
    pub fn consensus(&self) -> &Arc<ConsensusSet> {
        &self.consensus
    }

    /// Transaction pool subsystem
    pub fn tpool(&self) -> &Arc<TransactionPool> {
        &self.tpool
    }

    /// Wallet subsystem
    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    /// Miner subsystem
    pub fn miner(&self) -> &Arc<Miner> {
        &self.miner
    }

    /// Explorer subsystem
    pub fn explorer(&self) -> &Arc<Explorer> {
        &self.explorer
    }

    /// Barrier over this node's signals
    pub fn barrier(&self) -> &PropagationBarrier {
        &self.barrier
    }

    /// Mutable barrier, for waiting
    pub fn barrier_mut(&mut self) -> &mut PropagationBarrier {
        &mut self.barrier
    }

    /// See [`PropagationBarrier::await_pool_propagation`]
    pub async fn await_pool_propagation(&mut self) {
        self.barrier.await_pool_propagation().await
    }

    /// See [`PropagationBarrier::await_consensus_propagation`]
    pub async fn await_consensus_propagation(&mut self) {
        self.barrier.await_consensus_propagation().await
    }

    /// A new subscription to a role's signal. The network has none.
    pub fn subscribe(&self, role: Role) -> Option<ChangeSignal> {
        match role {
            Role::Network => None,
            Role::Consensus => Some(self.consensus.notify()),
            Role::TransactionPool => Some(self.tpool.notify()),
            Role::Wallet => Some(self.wallet.notify()),
            Role::Miner => Some(self.miner.notify()),
            Role::Explorer => Some(self.explorer.notify()),
        }
    }

    /// Events a role has finished processing. The network has no count.
    pub fn processed_count(&self, role: Role) -> Option<u64> {
        match role {
            Role::Network => None,
            Role::Consensus => Some(self.consensus.processed_count()),
            Role::TransactionPool => Some(self.tpool.processed_count()),
            Role::Wallet => Some(self.wallet.processed_count()),
            Role::Miner => Some(self.miner.processed_count()),
            Role::Explorer => Some(self.explorer.processed_count()),
        }
    }

    /// Metrics this node records into
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Refresh subsystem gauges and take a snapshot
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let metrics = &self.metrics;
        for role in Role::CONSTRUCTION_ORDER {
            if let Some(count) = self.processed_count(role) {
                metrics.set_gauge(&format!("processed.{}", role), count as i64);
            }
        }
        metrics.set_gauge("consensus.height", self.consensus.height() as i64);
        metrics.set_gauge("txpool.size", self.tpool.len() as i64);
        metrics.set_gauge("network.peers", self.network.peer_count() as i64);
        metrics.set_gauge("network.relayed", self.network.relayed_count() as i64);
        metrics.set_gauge("miner.blocks_mined", self.miner.blocks_mined() as i64);
        MetricsSnapshot::from_metrics(metrics)
    }

    /// Close every subsystem, dependents first
    pub async fn shutdown(&self) {
        for role in Role::CONSTRUCTION_ORDER.iter().rev() {
            match role {
                Role::Explorer => self.explorer.close().await,
                Role::Miner => self.miner.close().await,
                Role::Wallet => self.wallet.close().await,
                Role::TransactionPool => self.tpool.close().await,
                Role::Consensus => self.consensus.close().await,
                Role::Network => self.network.close().await,
            }
            debug!(%role, "closed");
        }
        info!(root = %self.config.root.display(), "Node shut down");
    }
}
