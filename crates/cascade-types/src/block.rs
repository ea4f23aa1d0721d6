//! Block types

use crate::{keccak256, Address, Amount, BlockHeight, Transaction, H256};
use serde::{Deserialize, Serialize};

/// Block header
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Parent block hash
    pub parent_hash: H256,
    /// Block height, genesis is 0
    pub height: BlockHeight,
    /// Block timestamp (Unix seconds)
    pub timestamp: u64,
    /// Address receiving the block reward and fees
    pub payout: Address,
    /// Newly issued coins
    pub reward: Amount,
    /// Free-form nonce chosen by the miner
    pub nonce: u64,
}

/// Complete block (header + transactions)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// Transactions included in this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The genesis block. Identical for every node.
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                parent_hash: H256::ZERO,
                height: 0,
                timestamp: 0,
                payout: Address::ZERO,
                reward: 0,
                nonce: 0,
            },
            transactions: Vec::new(),
        }
    }

    /// Block hash over the header fields and every transaction hash
    pub fn hash(&self) -> H256 {
        let header = &self.header;
        let mut data = Vec::with_capacity(96 + self.transactions.len() * H256::LEN);
        data.extend_from_slice(header.parent_hash.as_bytes());
        data.extend_from_slice(&header.height.to_le_bytes());
        data.extend_from_slice(&header.timestamp.to_le_bytes());
        data.extend_from_slice(header.payout.as_bytes());
        data.extend_from_slice(&header.reward.to_le_bytes());
        data.extend_from_slice(&header.nonce.to_le_bytes());
        for tx in &self.transactions {
            data.extend_from_slice(tx.hash().as_bytes());
        }
        keccak256(&data)
    }

    /// Block height
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Parent hash
    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }

    /// Sum of fees over all transactions
    pub fn total_fees(&self) -> Amount {
        self.transactions
            .iter()
            .fold(0, |acc: Amount, tx| acc.saturating_add(tx.fee))
    }

    /// Everything paid to the payout address: reward plus fees
    pub fn payout_total(&self) -> Amount {
        self.header.reward.saturating_add(self.total_fees())
    }
}
