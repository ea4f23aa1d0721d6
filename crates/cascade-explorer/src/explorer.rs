//! Explorer projection

use crate::error::{ExplorerError, ExplorerResult};
use cascade_consensus::{ConsensusResult, ConsensusSet};
use cascade_signal::{ChangeSignal, Notifier, Notify, Reactor};
use cascade_types::{Address, Amount, Block, BlockHeight, H256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Chain summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerStatus {
    /// Height of the last projected block
    pub height: BlockHeight,
    /// Hash of the last projected block
    pub tip: H256,
    /// Transactions across all projected blocks
    pub total_transactions: u64,
    /// Sum of block rewards
    pub coins_issued: Amount,
}

struct Projection {
    status: ExplorerStatus,
    block_heights: HashMap<H256, BlockHeight>,
    tx_heights: HashMap<H256, BlockHeight>,
    by_address: HashMap<Address, Vec<H256>>,
}

impl Projection {
    fn apply(&mut self, block: &Block) {
        let height = block.height();
        let hash = block.hash();
        self.block_heights.insert(hash, height);
        for tx in &block.transactions {
            let tx_hash = tx.hash();
            self.tx_heights.insert(tx_hash, height);
            self.by_address.entry(tx.from).or_default().push(tx_hash);
            if tx.to != tx.from {
                self.by_address.entry(tx.to).or_default().push(tx_hash);
            }
        }
        self.status.height = height;
        self.status.tip = hash;
        self.status.total_transactions += block.transactions.len() as u64;
        self.status.coins_issued = self.status.coins_issued.saturating_add(block.header.reward);
    }
}

struct ExplorerInner {
    consensus: Arc<ConsensusSet>,
    projection: RwLock<Projection>,
    processed: AtomicU64,
    notifier: Notifier,
}

/// Explorer subsystem
pub struct Explorer {
    inner: Arc<ExplorerInner>,
    reactor: Reactor,
}

impl Explorer {
    /// Project the current chain and follow consensus from here on.
    /// Must run inside a tokio runtime.
    pub fn new(consensus: Arc<ConsensusSet>) -> ExplorerResult<Arc<Self>> {
        let upstream = consensus.notify();
        let genesis = consensus.block_at(0)?.ok_or(ExplorerError::MissingGenesis)?;

        let mut projection = Projection {
            status: ExplorerStatus {
                height: 0,
                tip: genesis.hash(),
                total_transactions: 0,
                coins_issued: 0,
            },
            block_heights: HashMap::new(),
            tx_heights: HashMap::new(),
            by_address: HashMap::new(),
        };
        projection.apply(&genesis);
        for block in consensus.blocks_since(0)? {
            projection.apply(&block);
        }

        let inner = Arc::new(ExplorerInner {
            consensus,
            projection: RwLock::new(projection),
            processed: AtomicU64::new(0),
            notifier: Notifier::new(),
        });

        let reactor = {
            let inner = inner.clone();
            Reactor::spawn("explorer", upstream, move || inner.follow())
        };

        Ok(Arc::new(Self { inner, reactor }))
    }

    /// Chain summary
    pub fn status(&self) -> ExplorerStatus {
        self.inner.projection.read().status.clone()
    }

    /// Height of a projected block
    pub fn block_height(&self, hash: &H256) -> Option<BlockHeight> {
        self.inner.projection.read().block_heights.get(hash).copied()
    }

    /// Height at which a transaction was confirmed
    pub fn transaction_height(&self, hash: &H256) -> Option<BlockHeight> {
        self.inner.projection.read().tx_heights.get(hash).copied()
    }

    /// Confirmed transactions touching `address`, oldest first
    pub fn address_transactions(&self, address: &Address) -> Vec<H256> {
        self.inner
            .projection
            .read()
            .by_address
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of consensus changes projected since construction
    pub fn processed_count(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    /// Stop following consensus
    pub async fn close(&self) {
        self.reactor.close().await;
        debug!("Explorer closed");
    }
}

impl Notify for Explorer {
    fn notify(&self) -> ChangeSignal {
        self.inner.notifier.subscribe()
    }
}

impl ExplorerInner {
    fn catch_up(&self) -> ConsensusResult<usize> {
        let mut projection = self.projection.write();
        let blocks = self.consensus.blocks_since(projection.status.height)?;
        for block in &blocks {
            projection.apply(block);
        }
        Ok(blocks.len())
    }

    fn follow(&self) {
        match self.catch_up() {
            Ok(applied) => debug!(applied, "Explorer projection updated"),
            Err(e) => warn!(error = %e, "Explorer failed to read new blocks"),
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.notifier.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_network::{Network, NetworkConfig};
    use cascade_types::{BlockHeader, Transaction};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    async fn setup(dir: &TempDir) -> Arc<ConsensusSet> {
        let network = Network::bind(NetworkConfig::default(), dir.path().join("network"))
            .await
            .unwrap();
        ConsensusSet::new(network, dir.path().join("consensus")).unwrap()
    }

    fn child_of(parent: &Block, txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                parent_hash: parent.hash(),
                height: parent.height() + 1,
                timestamp: 1,
                payout: Address::from_bytes([9; 20]),
                reward: 25,
                nonce: 0,
            },
            transactions: txs,
        }
    }

    #[tokio::test]
    async fn test_genesis_projection() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let explorer = Explorer::new(consensus.clone()).unwrap();

        let status = explorer.status();
        assert_eq!(status.height, 0);
        assert_eq!(status.tip, consensus.genesis_hash());
        assert_eq!(status.total_transactions, 0);
        assert_eq!(status.coins_issued, 0);
        assert_eq!(explorer.block_height(&consensus.genesis_hash()), Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_follows_consensus() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let explorer = Explorer::new(consensus.clone()).unwrap();
        let mut signal = explorer.notify();

        let alice = Address::from_bytes([1; 20]);
        let bob = Address::from_bytes([2; 20]);
        let tx = Transaction::new(alice, bob, 10, 1, 0);
        let block = child_of(&Block::genesis(), vec![tx.clone()]);
        consensus.accept_block(block.clone()).await.unwrap();
        timeout(Duration::from_secs(5), signal.wait()).await.unwrap();

        let status = explorer.status();
        assert_eq!(status.height, 1);
        assert_eq!(status.tip, block.hash());
        assert_eq!(status.total_transactions, 1);
        assert_eq!(status.coins_issued, 25);
        assert_eq!(explorer.block_height(&block.hash()), Some(1));
        assert_eq!(explorer.transaction_height(&tx.hash()), Some(1));
        assert_eq!(explorer.address_transactions(&alice), vec![tx.hash()]);
        assert_eq!(explorer.address_transactions(&bob), vec![tx.hash()]);
        assert_eq!(explorer.processed_count(), 1);
    }

    #[tokio::test]
    async fn test_projects_existing_chain() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let b1 = child_of(&Block::genesis(), vec![]);
        let b2 = child_of(&b1, vec![]);
        consensus.accept_block(b1).await.unwrap();
        consensus.accept_block(b2.clone()).await.unwrap();

        let explorer = Explorer::new(consensus).unwrap();
        assert_eq!(explorer.status().height, 2);
        assert_eq!(explorer.status().tip, b2.hash());
        assert_eq!(explorer.status().coins_issued, 50);
        assert!(!explorer.notify().is_pending());
    }

    #[test]
    fn test_status_json() {
        let status = ExplorerStatus {
            height: 3,
            tip: H256::from_bytes([1; 32]),
            total_transactions: 4,
            coins_issued: 150,
        };
        let json = serde_json::to_string(&status).unwrap();
        let decoded: ExplorerStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, status);
    }
}
