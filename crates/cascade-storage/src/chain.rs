//! Typed block storage

use crate::db::{cf, Database};
use crate::error::{StorageError, StorageResult};
use cascade_types::{Block, BlockHeight, H256};

const TIP_KEY: &[u8] = b"tip_height";

/// Block store keyed by hash, with a height index and a tip pointer
pub struct ChainDb {
    db: Database,
}

impl ChainDb {
    /// Wrap an open database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Store a block, index its height and move the tip to it in one batch
    pub fn put_block(&self, block: &Block) -> StorageResult<H256> {
        let hash = block.hash();
        let encoded =
            serde_json::to_vec(block).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let height = block.height().to_be_bytes();

        let mut batch = self.db.batch();
        batch.put(cf::BLOCKS, hash.as_bytes(), &encoded);
        batch.put(cf::BLOCK_INDEX, &height, hash.as_bytes());
        batch.put(cf::META, TIP_KEY, &height);
        self.db.write_batch(batch)?;
        Ok(hash)
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &H256) -> StorageResult<Option<Block>> {
        match self.db.get(cf::BLOCKS, hash.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether a block with this hash is stored
    pub fn has_block(&self, hash: &H256) -> StorageResult<bool> {
        Ok(self.db.get(cf::BLOCKS, hash.as_bytes())?.is_some())
    }

    /// Get block hash by height
    pub fn hash_by_height(&self, height: BlockHeight) -> StorageResult<Option<H256>> {
        match self.db.get(cf::BLOCK_INDEX, &height.to_be_bytes())? {
            Some(bytes) => H256::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Get block by height
    pub fn block_by_height(&self, height: BlockHeight) -> StorageResult<Option<Block>> {
        match self.hash_by_height(height)? {
            Some(hash) => {
                let block = self.get_block(&hash)?;
                if block.is_none() {
                    return Err(StorageError::Corrupt(format!(
                        "height {} indexes missing block {}",
                        height,
                        hash.short()
                    )));
                }
                Ok(block)
            }
            None => Ok(None),
        }
    }

    /// Height of the latest stored block, `None` for an empty store
    pub fn tip_height(&self) -> StorageResult<Option<BlockHeight>> {
        match self.db.get(cf::META, TIP_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("tip height is not 8 bytes".into()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Latest stored block
    pub fn tip(&self) -> StorageResult<Option<Block>> {
        match self.tip_height()? {
            Some(height) => match self.block_by_height(height)? {
                Some(block) => Ok(Some(block)),
                None => Err(StorageError::Corrupt(format!(
                    "tip height {} has no block",
                    height
                ))),
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::{Address, BlockHeader, Transaction};
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, ChainDb) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path()).unwrap();
        (dir, ChainDb::new(db))
    }

    fn child_of(parent: &Block) -> Block {
        Block {
            header: BlockHeader {
                parent_hash: parent.hash(),
                height: parent.height() + 1,
                timestamp: 1,
                payout: Address::from_bytes([3; 20]),
                reward: 50,
                nonce: 7,
            },
            transactions: vec![Transaction::new(
                Address::from_bytes([3; 20]),
                Address::from_bytes([4; 20]),
                10,
                1,
                0,
            )],
        }
    }

    #[test]
    fn test_empty_store() {
        let (_dir, chain) = open_temp();
        assert_eq!(chain.tip_height().unwrap(), None);
        assert!(chain.tip().unwrap().is_none());
        assert!(chain.block_by_height(0).unwrap().is_none());
    }

    #[test]
    fn test_put_and_get_block() {
        let (_dir, chain) = open_temp();
        let genesis = Block::genesis();
        let hash = chain.put_block(&genesis).unwrap();

        assert_eq!(hash, genesis.hash());
        assert!(chain.has_block(&hash).unwrap());
        assert_eq!(chain.get_block(&hash).unwrap(), Some(genesis.clone()));
        assert_eq!(chain.hash_by_height(0).unwrap(), Some(hash));
        assert_eq!(chain.tip_height().unwrap(), Some(0));
    }

    #[test]
    fn test_tip_follows_latest_put() {
        let (_dir, chain) = open_temp();
        let genesis = Block::genesis();
        let b1 = child_of(&genesis);
        let b2 = child_of(&b1);
        for block in [&genesis, &b1, &b2] {
            chain.put_block(block).unwrap();
        }

        assert_eq!(chain.tip_height().unwrap(), Some(2));
        assert_eq!(chain.tip().unwrap(), Some(b2));
        assert_eq!(chain.block_by_height(1).unwrap(), Some(b1));
    }

    #[test]
    fn test_unknown_hash() {
        let (_dir, chain) = open_temp();
        let missing = H256::from_bytes([0xab; 32]);
        assert!(!chain.has_block(&missing).unwrap());
        assert!(chain.get_block(&missing).unwrap().is_none());
    }

    #[test]
    fn test_dangling_index_is_corrupt() {
        let (_dir, chain) = open_temp();
        chain
            .database()
            .put(cf::BLOCK_INDEX, &5u64.to_be_bytes(), &[0x11; 32])
            .unwrap();
        assert!(matches!(
            chain.block_by_height(5),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let genesis = Block::genesis();
        let b1 = child_of(&genesis);
        {
            let chain = ChainDb::new(Database::open_at(dir.path()).unwrap());
            chain.put_block(&genesis).unwrap();
            chain.put_block(&b1).unwrap();
        }
        let chain = ChainDb::new(Database::open_at(dir.path()).unwrap());
        assert_eq!(chain.tip().unwrap(), Some(b1));
    }
}
