//! Miner subsystem

use crate::error::{MinerError, MinerResult};
use cascade_consensus::ConsensusSet;
use cascade_signal::{ChangeSignal, Notifier, Notify, Reactor};
use cascade_txpool::TransactionPool;
use cascade_types::{unix_now, Address, Amount, Block, BlockHeader};
use cascade_wallet::Wallet;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Miner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Coins issued to the payout address per block
    pub block_reward: Amount,
    /// Maximum transactions taken from the pool per block
    pub max_block_transactions: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            block_reward: 50,
            max_block_transactions: 1000,
        }
    }
}

struct MinerInner {
    config: MinerConfig,
    consensus: Arc<ConsensusSet>,
    tpool: Arc<TransactionPool>,
    payout: Address,
    template: RwLock<Block>,
    processed: AtomicU64,
    notifier: Notifier,
}

/// Miner subsystem
pub struct Miner {
    inner: Arc<MinerInner>,
    reactor: Reactor,
    mine_lock: tokio::sync::Mutex<()>,
    blocks_mined: AtomicU64,
}

impl Miner {
    /// Create a miner with default config paying to the wallet's primary
    /// address. Must run inside a tokio runtime.
    pub fn new(
        consensus: Arc<ConsensusSet>,
        tpool: Arc<TransactionPool>,
        wallet: Arc<Wallet>,
    ) -> MinerResult<Arc<Self>> {
        Self::with_config(consensus, tpool, wallet, MinerConfig::default())
    }

    /// Create a miner with custom config
    pub fn with_config(
        consensus: Arc<ConsensusSet>,
        tpool: Arc<TransactionPool>,
        wallet: Arc<Wallet>,
        config: MinerConfig,
    ) -> MinerResult<Arc<Self>> {
        if config.max_block_transactions == 0 {
            return Err(MinerError::InvalidConfig(
                "max_block_transactions must be positive".into(),
            ));
        }

        let upstream = tpool.notify();
        let payout = wallet.address();
        let template = build_template(&config, &consensus, &tpool, payout);
        let inner = Arc::new(MinerInner {
            config,
            consensus,
            tpool,
            payout,
            template: RwLock::new(template),
            processed: AtomicU64::new(0),
            notifier: Notifier::new(),
        });

        let reactor = {
            let inner = inner.clone();
            Reactor::spawn("miner", upstream, move || inner.refresh_template())
        };

        info!(%payout, "Miner started");
        Ok(Arc::new(Self {
            inner,
            reactor,
            mine_lock: tokio::sync::Mutex::new(()),
            blocks_mined: AtomicU64::new(0),
        }))
    }

    /// Template as of the last pool change
    pub fn block_template(&self) -> Block {
        self.inner.template.read().clone()
    }

    /// Build a block on the current tip from pooled transactions and submit it
    pub async fn mine_block(&self) -> MinerResult<Block> {
        let _guard = self.mine_lock.lock().await;
        let inner = &self.inner;
        let block = build_template(&inner.config, &inner.consensus, &inner.tpool, inner.payout);

        inner.consensus.accept_block(block.clone()).await?;
        self.blocks_mined.fetch_add(1, Ordering::SeqCst);
        info!(
            height = block.height(),
            txs = block.transactions.len(),
            "Mined block"
        );
        Ok(block)
    }

    /// Blocks mined and accepted since construction
    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::SeqCst)
    }

    /// Address receiving rewards and fees
    pub fn payout_address(&self) -> Address {
        self.inner.payout
    }

    /// Miner configuration
    pub fn config(&self) -> &MinerConfig {
        &self.inner.config
    }

    /// Number of pool changes processed since construction
    pub fn processed_count(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    /// Stop the template reactor and wait for it
    pub async fn close(&self) {
        self.reactor.close().await;
        debug!(mined = self.blocks_mined(), "Miner closed");
    }
}

impl Notify for Miner {
    fn notify(&self) -> ChangeSignal {
        self.inner.notifier.subscribe()
    }
}

impl MinerInner {
    fn refresh_template(&self) {
        let template = build_template(&self.config, &self.consensus, &self.tpool, self.payout);
        debug!(
            height = template.height(),
            txs = template.transactions.len(),
            "Block template rebuilt"
        );
        *self.template.write() = template;
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.notifier.publish();
    }
}

fn build_template(
    config: &MinerConfig,
    consensus: &ConsensusSet,
    tpool: &TransactionPool,
    payout: Address,
) -> Block {
    let parent = consensus.current_block();
    let transactions = tpool
        .transactions()
        .into_iter()
        .take(config.max_block_transactions)
        .map(|pooled| pooled.tx)
        .collect();

    Block {
        header: BlockHeader {
            parent_hash: parent.hash(),
            height: parent.height() + 1,
            timestamp: unix_now(),
            payout,
            reward: config.block_reward,
            nonce: 0,
        },
        transactions,
    }
}
