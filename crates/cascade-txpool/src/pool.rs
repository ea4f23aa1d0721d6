//! Transaction pool implementation

use crate::error::{TxPoolError, TxPoolResult};
use cascade_consensus::ConsensusSet;
use cascade_network::Network;
use cascade_signal::{ChangeSignal, Notifier, Notify, Reactor};
use cascade_types::{Amount, BlockHeight, Transaction, H256};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pooled transactions
    pub max_size: usize,
    /// Minimum fee accepted
    pub min_fee: Amount,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4096,
            min_fee: 0,
        }
    }
}

/// Transaction with pool metadata
#[derive(Clone, Debug)]
pub struct PooledTransaction {
    /// The transaction
    pub tx: Transaction,
    /// Transaction hash
    pub hash: H256,
    /// Arrival order, used to break fee ties
    pub seq: u64,
}

struct PoolInner {
    config: PoolConfig,
    consensus: Arc<ConsensusSet>,
    network: Arc<Network>,
    by_hash: DashMap<H256, PooledTransaction>,
    next_seq: AtomicU64,
    /// Serializes admission so the size limit holds
    admit: Mutex<()>,
    /// Height of the last block whose transactions were pruned
    synced_height: Mutex<BlockHeight>,
    processed: AtomicU64,
    notifier: Notifier,
}

/// Transaction pool subsystem
pub struct TransactionPool {
    inner: Arc<PoolInner>,
    reactor: Reactor,
}

impl TransactionPool {
    /// Create a pool with default config. Must run inside a tokio runtime.
    pub fn new(consensus: Arc<ConsensusSet>, network: Arc<Network>) -> TxPoolResult<Arc<Self>> {
        Self::with_config(consensus, network, PoolConfig::default())
    }

    /// Create a pool with custom config
    pub fn with_config(
        consensus: Arc<ConsensusSet>,
        network: Arc<Network>,
        config: PoolConfig,
    ) -> TxPoolResult<Arc<Self>> {
        if config.max_size == 0 {
            return Err(TxPoolError::InvalidConfig("max_size must be positive".into()));
        }

        let upstream = consensus.notify();
        let synced = consensus.height();
        let inner = Arc::new(PoolInner {
            config,
            consensus,
            network,
            by_hash: DashMap::new(),
            next_seq: AtomicU64::new(0),
            admit: Mutex::new(()),
            synced_height: Mutex::new(synced),
            processed: AtomicU64::new(0),
            notifier: Notifier::new(),
        });

        let reactor = {
            let inner = inner.clone();
            Reactor::spawn("txpool", upstream, move || inner.prune_confirmed())
        };

        debug!(height = synced, "Transaction pool started");
        Ok(Arc::new(Self { inner, reactor }))
    }

    /// Admit a transaction, relay it and publish
    pub async fn accept_transaction(&self, tx: Transaction) -> TxPoolResult<H256> {
        let inner = &self.inner;
        let hash = tx.hash();
        {
            let _admit = inner.admit.lock();
            if tx.amount == 0 {
                return Err(TxPoolError::ZeroAmount);
            }
            if tx.fee < inner.config.min_fee {
                return Err(TxPoolError::FeeTooLow {
                    fee: tx.fee,
                    min: inner.config.min_fee,
                });
            }
            if inner.by_hash.contains_key(&hash) {
                return Err(TxPoolError::AlreadyExists(hash));
            }
            if inner.consensus.is_confirmed(&hash) {
                return Err(TxPoolError::AlreadyConfirmed(hash));
            }
            if inner.by_hash.len() >= inner.config.max_size {
                return Err(TxPoolError::PoolFull(inner.config.max_size));
            }

            let seq = inner.next_seq.fetch_add(1, Ordering::SeqCst);
            inner.by_hash.insert(
                hash,
                PooledTransaction {
                    tx: tx.clone(),
                    hash,
                    seq,
                },
            );
        }

        inner.network.relay_transaction(&tx).await;
        inner.processed.fetch_add(1, Ordering::SeqCst);
        debug!(hash = %hash.short(), fee = tx.fee, "Accepted transaction");
        inner.notifier.publish();
        Ok(hash)
    }

    /// Pooled transactions, highest fee first, then by arrival
    pub fn transactions(&self) -> Vec<PooledTransaction> {
        let mut txs: Vec<PooledTransaction> = self
            .inner
            .by_hash
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        txs.sort_by(|a, b| b.tx.fee.cmp(&a.tx.fee).then(a.seq.cmp(&b.seq)));
        txs
    }

    /// Get a pooled transaction by hash
    pub fn get(&self, hash: &H256) -> Option<Transaction> {
        self.inner.by_hash.get(hash).map(|entry| entry.tx.clone())
    }

    /// Whether a transaction is pooled
    pub fn contains(&self, hash: &H256) -> bool {
        self.inner.by_hash.contains_key(hash)
    }

    /// Number of pooled transactions
    pub fn len(&self) -> usize {
        self.inner.by_hash.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.inner.by_hash.is_empty()
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Height up to which confirmed transactions have been pruned
    pub fn synced_height(&self) -> BlockHeight {
        *self.inner.synced_height.lock()
    }

    /// Accepted transactions plus processed consensus changes
    pub fn processed_count(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    /// Stop the pruning reactor and wait for it
    pub async fn close(&self) {
        self.reactor.close().await;
        debug!(pooled = self.len(), "Transaction pool closed");
    }
}

impl Notify for TransactionPool {
    fn notify(&self) -> ChangeSignal {
        self.inner.notifier.subscribe()
    }
}

impl PoolInner {
    fn prune_confirmed(&self) {
        {
            let mut synced = self.synced_height.lock();
            match self.consensus.blocks_since(*synced) {
                Ok(blocks) => {
                    let mut pruned = 0usize;
                    for block in &blocks {
                        for tx in &block.transactions {
                            if self.by_hash.remove(&tx.hash()).is_some() {
                                pruned += 1;
                            }
                        }
                    }
                    if let Some(last) = blocks.last() {
                        *synced = last.height();
                    }
                    debug!(
                        height = *synced,
                        blocks = blocks.len(),
                        pruned,
                        pooled = self.by_hash.len(),
                        "Pool synced to consensus"
                    );
                }
                Err(e) => warn!(error = %e, "Failed to read new blocks"),
            }
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.notifier.publish();
    }
}
