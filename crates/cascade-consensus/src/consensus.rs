//! Consensus set

use crate::error::{ConsensusError, ConsensusResult};
use cascade_network::Network;
use cascade_signal::{ChangeSignal, Notifier, Notify};
use cascade_storage::{ChainDb, Database};
use cascade_types::{Block, BlockHeight, H256};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct Tip {
    hash: H256,
    block: Block,
}

/// The node's view of the chain.
///
/// Every accepted block is persisted, becomes the new tip and is relayed
/// before the change signal fires.
pub struct ConsensusSet {
    network: Arc<Network>,
    chain: ChainDb,
    tip: RwLock<Tip>,
    genesis_hash: H256,
    /// Confirmed transaction hash -> block height
    confirmed: DashMap<H256, BlockHeight>,
    accept_lock: tokio::sync::Mutex<()>,
    processed: AtomicU64,
    notifier: Notifier,
}

impl ConsensusSet {
    /// Open the chain under `dir`, writing genesis into an empty store
    pub fn new(network: Arc<Network>, dir: impl AsRef<Path>) -> ConsensusResult<Arc<Self>> {
        let chain = ChainDb::new(Database::open_at(dir.as_ref())?);
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash();

        let tip = match chain.tip()? {
            Some(tip) => tip,
            None => {
                chain.put_block(&genesis)?;
                debug!(hash = %genesis_hash.short(), "Wrote genesis block");
                genesis
            }
        };

        match chain.hash_by_height(0)? {
            Some(stored) if stored == genesis_hash => {}
            Some(stored) => return Err(ConsensusError::GenesisMismatch(stored)),
            None => return Err(ConsensusError::GenesisMismatch(H256::ZERO)),
        }

        let confirmed = DashMap::new();
        for height in 1..=tip.height() {
            if let Some(block) = chain.block_by_height(height)? {
                for tx in &block.transactions {
                    confirmed.insert(tx.hash(), height);
                }
            }
        }

        info!(
            height = tip.height(),
            tip = %tip.hash().short(),
            "Consensus set loaded"
        );

        Ok(Arc::new(Self {
            network,
            chain,
            tip: RwLock::new(Tip {
                hash: tip.hash(),
                block: tip,
            }),
            genesis_hash,
            confirmed,
            accept_lock: tokio::sync::Mutex::new(()),
            processed: AtomicU64::new(0),
            notifier: Notifier::new(),
        }))
    }

    /// Accept a block extending the current tip
    pub async fn accept_block(&self, block: Block) -> ConsensusResult<H256> {
        let hash = block.hash();
        let _guard = self.accept_lock.lock().await;

        if self.chain.has_block(&hash)? {
            return Err(ConsensusError::BlockKnown(hash));
        }
        {
            let tip = self.tip.read();
            if block.parent_hash() != tip.hash {
                return Err(ConsensusError::UnknownParent {
                    parent: block.parent_hash(),
                    tip: tip.hash,
                });
            }
            let expected = tip.block.height() + 1;
            if block.height() != expected {
                return Err(ConsensusError::WrongHeight {
                    expected,
                    got: block.height(),
                });
            }
        }

        self.chain.put_block(&block)?;
        for tx in &block.transactions {
            self.confirmed.insert(tx.hash(), block.height());
        }
        *self.tip.write() = Tip {
            hash,
            block: block.clone(),
        };

        self.network.relay_block(&block).await;
        self.processed.fetch_add(1, Ordering::SeqCst);
        info!(
            height = block.height(),
            hash = %hash.short(),
            txs = block.transactions.len(),
            "Accepted block"
        );
        self.notifier.publish();
        Ok(hash)
    }

    /// Current chain height
    pub fn height(&self) -> BlockHeight {
        self.tip.read().block.height()
    }

    /// Hash of the current tip
    pub fn tip_hash(&self) -> H256 {
        self.tip.read().hash
    }

    /// The current tip block
    pub fn current_block(&self) -> Block {
        self.tip.read().block.clone()
    }

    /// Genesis block hash
    pub fn genesis_hash(&self) -> H256 {
        self.genesis_hash
    }

    /// Block at `height` on the chain
    pub fn block_at(&self, height: BlockHeight) -> ConsensusResult<Option<Block>> {
        Ok(self.chain.block_by_height(height)?)
    }

    /// Every block above `height`, oldest first
    pub fn blocks_since(&self, height: BlockHeight) -> ConsensusResult<Vec<Block>> {
        let tip = self.height();
        let mut blocks = Vec::new();
        for h in height.saturating_add(1)..=tip {
            if let Some(block) = self.chain.block_by_height(h)? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    /// Height at which a transaction was confirmed, if it was
    pub fn transaction_height(&self, hash: &H256) -> Option<BlockHeight> {
        self.confirmed.get(hash).map(|entry| *entry.value())
    }

    /// Whether a transaction is part of the chain
    pub fn is_confirmed(&self, hash: &H256) -> bool {
        self.confirmed.contains_key(hash)
    }

    /// Number of blocks accepted since construction
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// The network blocks are relayed through
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Wait for any in-flight acceptance, then close the store
    pub async fn close(&self) {
        let _guard = self.accept_lock.lock().await;
        self.chain.database().close();
        info!(height = self.height(), "Consensus set closed");
    }
}

impl Notify for ConsensusSet {
    fn notify(&self) -> ChangeSignal {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_network::NetworkConfig;
    use cascade_types::{Address, BlockHeader, Transaction};
    use tempfile::TempDir;

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
                payout: Address::from_bytes([1; 20]),
                reward: 50,
                nonce: 0,
            },
            transactions: txs,
        }
    }

    fn transfer(nonce: u64) -> Transaction {
        Transaction::new(
            Address::from_bytes([1; 20]),
            Address::from_bytes([2; 20]),
            10,
            1,
            nonce,
        )
    }

    #[tokio::test]
    async fn test_starts_at_genesis() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;

        assert_eq!(consensus.height(), 0);
        assert_eq!(consensus.current_block(), Block::genesis());
        assert_eq!(consensus.genesis_hash(), Block::genesis().hash());
        assert_eq!(consensus.tip_hash(), consensus.genesis_hash());
        assert_eq!(consensus.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_accept_block_moves_tip_and_publishes() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let mut signal = consensus.notify();

        let tx = transfer(0);
        let block = child_of(&Block::genesis(), vec![tx.clone()]);
        let hash = consensus.accept_block(block.clone()).await.unwrap();

        assert_eq!(hash, block.hash());
        assert_eq!(consensus.height(), 1);
        assert_eq!(consensus.current_block(), block);
        assert_eq!(consensus.block_at(1).unwrap(), Some(block));
        assert_eq!(consensus.transaction_height(&tx.hash()), Some(1));
        assert_eq!(consensus.processed_count(), 1);
        assert_eq!(consensus.network().relayed_count(), 1);
        assert!(signal.try_take());
        assert!(!signal.is_pending());
    }

    #[tokio::test]
    async fn test_rejects_known_block() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let block = child_of(&Block::genesis(), vec![]);
        consensus.accept_block(block.clone()).await.unwrap();

        let mut signal = consensus.notify();
        assert!(matches!(
            consensus.accept_block(block).await,
            Err(ConsensusError::BlockKnown(_))
        ));
        assert!(matches!(
            consensus.accept_block(Block::genesis()).await,
            Err(ConsensusError::BlockKnown(_))
        ));
        assert_eq!(consensus.processed_count(), 1);
        assert!(!signal.try_take());
    }

    #[tokio::test]
    async fn test_rejects_unknown_parent() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let b1 = child_of(&Block::genesis(), vec![]);
        let orphan = child_of(&b1, vec![]);

        assert!(matches!(
            consensus.accept_block(orphan).await,
            Err(ConsensusError::UnknownParent { .. })
        ));
        assert_eq!(consensus.height(), 0);
    }

    #[tokio::test]
    async fn test_rejects_wrong_height() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let mut block = child_of(&Block::genesis(), vec![]);
        block.header.height = 7;

        assert!(matches!(
            consensus.accept_block(block).await,
            Err(ConsensusError::WrongHeight {
                expected: 1,
                got: 7
            })
        ));
    }

    #[tokio::test]
    async fn test_blocks_since() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        let b1 = child_of(&Block::genesis(), vec![]);
        let b2 = child_of(&b1, vec![transfer(0)]);
        consensus.accept_block(b1.clone()).await.unwrap();
        consensus.accept_block(b2.clone()).await.unwrap();

        assert_eq!(consensus.blocks_since(0).unwrap(), vec![b1, b2.clone()]);
        assert_eq!(consensus.blocks_since(1).unwrap(), vec![b2]);
        assert!(consensus.blocks_since(2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reload_keeps_tip_and_index() {
        let dir = TempDir::new().unwrap();
        let tx = transfer(3);
        let block = child_of(&Block::genesis(), vec![tx.clone()]);
        {
            let consensus = setup(&dir).await;
            consensus.accept_block(block.clone()).await.unwrap();
            consensus.close().await;
        }

        let network = Network::bind(NetworkConfig::default(), dir.path().join("network2"))
            .await
            .unwrap();
        let consensus = ConsensusSet::new(network, dir.path().join("consensus")).unwrap();
        assert_eq!(consensus.height(), 1);
        assert_eq!(consensus.tip_hash(), block.hash());
        assert!(consensus.is_confirmed(&tx.hash()));
        assert_eq!(consensus.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let dir = TempDir::new().unwrap();
        let consensus = setup(&dir).await;
        consensus.close().await;

        assert!(matches!(
            consensus.block_at(0),
            Err(ConsensusError::Storage(_))
        ));
    }
}
