//! Wallet subsystem

use crate::error::{WalletError, WalletResult};
use cascade_consensus::ConsensusSet;
use cascade_signal::{ChangeSignal, Notifier, Notify, Reactor};
use cascade_storage::{cf, Database, StorageError};
use cascade_txpool::TransactionPool;
use cascade_types::{Address, Amount, Block, BlockHeight, Transaction, H256};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NEXT_NONCE_KEY: &[u8] = b"next_nonce";

/// Pooled flows touching the wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unconfirmed {
    /// Sum of pooled amounts paid to our addresses
    pub incoming: Amount,
    /// Sum of pooled amounts plus fees paid from our addresses
    pub outgoing: Amount,
}

#[derive(Default)]
struct Balances {
    synced_height: BlockHeight,
    confirmed: Amount,
    unconfirmed: Unconfirmed,
}

struct WalletInner {
    consensus: Arc<ConsensusSet>,
    tpool: Arc<TransactionPool>,
    store: Database,
    primary: Address,
    /// Ordered by derivation index; index 0 is the primary address
    addresses: RwLock<Vec<Address>>,
    balances: Mutex<Balances>,
    next_nonce: AtomicU64,
    send_lock: tokio::sync::Mutex<()>,
    processed: AtomicU64,
    notifier: Notifier,
}

/// Wallet subsystem
pub struct Wallet {
    inner: Arc<WalletInner>,
    reactor: Reactor,
}

impl Wallet {
    /// Open the wallet under `dir` and index the current chain and pool.
    /// Must run inside a tokio runtime.
    pub fn new(
        consensus: Arc<ConsensusSet>,
        tpool: Arc<TransactionPool>,
        dir: impl AsRef<Path>,
    ) -> WalletResult<Arc<Self>> {
        let store = Database::open_at(dir.as_ref())?;
        let mut addresses = load_addresses(&store)?;
        if addresses.is_empty() {
            let primary = Address::random();
            store.put(cf::ADDRESSES, &0u32.to_be_bytes(), primary.as_bytes())?;
            info!(address = %primary, "Created wallet address");
            addresses.push(primary);
        }
        let next_nonce = match store.get(cf::META, NEXT_NONCE_KEY)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };

        let primary = addresses[0];

        let upstream = tpool.notify();
        let inner = Arc::new(WalletInner {
            consensus,
            tpool,
            store,
            primary,
            addresses: RwLock::new(addresses),
            balances: Mutex::new(Balances::default()),
            next_nonce: AtomicU64::new(next_nonce),
            send_lock: tokio::sync::Mutex::new(()),
            processed: AtomicU64::new(0),
            notifier: Notifier::new(),
        });
        inner.sync()?;

        let reactor = {
            let inner = inner.clone();
            Reactor::spawn("wallet", upstream, move || inner.reindex())
        };

        Ok(Arc::new(Self { inner, reactor }))
    }

    /// Primary address; receives mining payouts and pays for sends
    pub fn address(&self) -> Address {
        self.inner.primary
    }

    /// Create and persist a new receiving address
    pub fn next_address(&self) -> WalletResult<Address> {
        let mut addresses = self.inner.addresses.write();
        let address = Address::random();
        let index = addresses.len() as u32;
        self.inner
            .store
            .put(cf::ADDRESSES, &index.to_be_bytes(), address.as_bytes())?;
        addresses.push(address);
        debug!(%address, index, "Created wallet address");
        Ok(address)
    }

    /// Every wallet address, primary first
    pub fn addresses(&self) -> Vec<Address> {
        self.inner.addresses.read().clone()
    }

    /// Whether `address` belongs to this wallet
    pub fn owns(&self, address: &Address) -> bool {
        self.inner.owns(address)
    }

    /// Balance from confirmed blocks
    pub fn confirmed_balance(&self) -> Amount {
        self.inner.balances.lock().confirmed
    }

    /// Pooled incoming and outgoing totals as of the last re-index
    pub fn unconfirmed(&self) -> Unconfirmed {
        self.inner.balances.lock().unconfirmed
    }

    /// Chain height the confirmed balance reflects
    pub fn synced_height(&self) -> BlockHeight {
        self.inner.balances.lock().synced_height
    }

    /// Confirmed balance minus everything we have pooled outgoing
    pub fn spendable(&self) -> Amount {
        let confirmed = self.confirmed_balance();
        let (_, outgoing) = self.inner.pooled_flows();
        confirmed.saturating_sub(outgoing)
    }

    /// Send `amount` from the primary address, paying `fee`
    pub async fn send(&self, to: Address, amount: Amount, fee: Amount) -> WalletResult<H256> {
        let _guard = self.inner.send_lock.lock().await;

        let needed = amount.saturating_add(fee);
        let available = self.spendable();
        if needed > available {
            return Err(WalletError::InsufficientFunds { needed, available });
        }

        let nonce = self.inner.next_nonce.load(Ordering::SeqCst);
        let tx = Transaction::new(self.address(), to, amount, fee, nonce);
        let hash = self.inner.tpool.accept_transaction(tx).await?;

        self.inner.next_nonce.store(nonce + 1, Ordering::SeqCst);
        self.inner
            .store
            .put(cf::META, NEXT_NONCE_KEY, &(nonce + 1).to_be_bytes())?;
        info!(hash = %hash.short(), %to, amount, fee, "Sent transaction");
        Ok(hash)
    }

    /// Number of pool changes re-indexed since construction
    pub fn processed_count(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    /// Stop the re-index reactor, then close the address store
    pub async fn close(&self) {
        self.reactor.close().await;
        self.inner.store.close();
        debug!("Wallet closed");
    }
}

impl Notify for Wallet {
    fn notify(&self) -> ChangeSignal {
        self.inner.notifier.subscribe()
    }
}

impl WalletInner {
    fn owns(&self, address: &Address) -> bool {
        self.addresses.read().contains(address)
    }

    /// Apply new blocks, then recompute pooled flows
    fn sync(&self) -> WalletResult<()> {
        let mut balances = self.balances.lock();
        let blocks = self.consensus.blocks_since(balances.synced_height)?;
        for block in &blocks {
            self.apply_block(&mut balances, block);
        }
        let (incoming, outgoing) = self.pooled_flows();
        balances.unconfirmed = Unconfirmed { incoming, outgoing };
        debug!(
            height = balances.synced_height,
            confirmed = balances.confirmed,
            incoming,
            outgoing,
            "Wallet indexed"
        );
        Ok(())
    }

    fn reindex(&self) {
        if let Err(e) = self.sync() {
            warn!(error = %e, "Wallet re-index failed");
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.notifier.publish();
    }

    fn apply_block(&self, balances: &mut Balances, block: &Block) {
        if self.owns(&block.header.payout) {
            balances.confirmed = balances.confirmed.saturating_add(block.payout_total());
        }
        for tx in &block.transactions {
            if self.owns(&tx.to) {
                balances.confirmed = balances.confirmed.saturating_add(tx.amount);
            }
            if self.owns(&tx.from) {
                balances.confirmed = balances.confirmed.saturating_sub(tx.total_cost());
            }
        }
        balances.synced_height = block.height();
    }

    fn pooled_flows(&self) -> (Amount, Amount) {
        let mut incoming: Amount = 0;
        let mut outgoing: Amount = 0;
        for pooled in self.tpool.transactions() {
            if self.owns(&pooled.tx.to) {
                incoming = incoming.saturating_add(pooled.tx.amount);
            }
            if self.owns(&pooled.tx.from) {
                outgoing = outgoing.saturating_add(pooled.tx.total_cost());
            }
        }
        (incoming, outgoing)
    }
}

fn load_addresses(store: &Database) -> WalletResult<Vec<Address>> {
    store
        .entries(cf::ADDRESSES)?
        .into_iter()
        .map(|(_, value)| {
            Address::from_slice(&value).map_err(|e| WalletError::CorruptAddress(e.to_string()))
        })
        .collect()
}

fn decode_u64(bytes: &[u8]) -> WalletResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt("nonce is not 8 bytes".into()))?;
    Ok(u64::from_be_bytes(arr))
}
