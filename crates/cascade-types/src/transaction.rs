//! Value transfer between two addresses

use crate::{keccak256, Address, Amount, H256};
use serde::{Deserialize, Serialize};

/// A transfer of `amount` from `from` to `to`, paying `fee` to the miner.
///
/// Signatures are not modelled; the nonce only keeps otherwise identical
/// transfers distinct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sending address
    pub from: Address,
    /// Receiving address
    pub to: Address,
    /// Amount transferred
    pub amount: Amount,
    /// Fee paid to the block's payout address
    pub fee: Amount,
    /// Sender-local sequence number
    pub nonce: u64,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(from: Address, to: Address, amount: Amount, fee: Amount, nonce: u64) -> Self {
        Self {
            from,
            to,
            amount,
            fee,
            nonce,
        }
    }

    /// Transaction hash
    ///
    /// Fields: from, to, amount, fee, nonce
    pub fn hash(&self) -> H256 {
        let mut data = Vec::with_capacity(Address::LEN * 2 + 24);
        data.extend_from_slice(self.from.as_bytes());
        data.extend_from_slice(self.to.as_bytes());
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.fee.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        keccak256(&data)
    }

    /// Amount plus fee, the total debited from the sender
    pub fn total_cost(&self) -> Amount {
        self.amount.saturating_add(self.fee)
    }

    /// Whether this transaction touches `address` on either side
    pub fn involves(&self, address: &Address) -> bool {
        self.from == *address || self.to == *address
    }
}
