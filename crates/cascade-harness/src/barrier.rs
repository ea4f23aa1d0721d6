//! Propagation barrier

use crate::composer::Role;
use cascade_metrics::{timed, Metrics};
use cascade_signal::ChangeSignal;
use std::sync::Arc;
use tracing::{debug, trace};

/// Drain order after a transaction-level change. The pool reacts first and
/// is what wakes the miner and the wallet.
pub const POOL_PROPAGATION_ORDER: [Role; 3] = [Role::TransactionPool, Role::Miner, Role::Wallet];

/// Drain order after a ledger-level change
pub const CONSENSUS_PROPAGATION_ORDER: [Role; 4] = [
    Role::Consensus,
    Role::TransactionPool,
    Role::Miner,
    Role::Wallet,
];

/// Blocks until a change has cascaded through every subsystem on its path.
///
/// A wait observes each signal in a fixed order and consumes nothing until
/// the last one is pending, then drains them all in that same order. A
/// signal that became pending early is still drained only when its turn
/// comes. Waits are cancel safe: a wait dropped part way through leaves
/// every signal as it found it.
///
/// There is no internal timeout: a subsystem that never publishes blocks
/// the caller forever.
pub struct PropagationBarrier {
    consensus: ChangeSignal,
    tpool: ChangeSignal,
    miner: ChangeSignal,
    wallet: ChangeSignal,
    metrics: Arc<Metrics>,
}

impl PropagationBarrier {
    /// Build from four subscriptions, with a private metrics store
    pub fn new(
        consensus: ChangeSignal,
        tpool: ChangeSignal,
        miner: ChangeSignal,
        wallet: ChangeSignal,
    ) -> Self {
        Self::with_metrics(consensus, tpool, miner, wallet, Arc::new(Metrics::new()))
    }

    /// Build from four subscriptions, recording into `metrics`
    pub fn with_metrics(
        consensus: ChangeSignal,
        tpool: ChangeSignal,
        miner: ChangeSignal,
        wallet: ChangeSignal,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            consensus,
            tpool,
            miner,
            wallet,
            metrics,
        }
    }

    /// Wait for the pool, then the miner, then the wallet
    pub async fn await_pool_propagation(&mut self) {
        let metrics = self.metrics.clone();
        timed!(metrics, "barrier.pool_wait", {
            self.drain_in_order(&POOL_PROPAGATION_ORDER).await
        });
    }

    /// Wait for consensus, then the whole pool propagation
    pub async fn await_consensus_propagation(&mut self) {
        let metrics = self.metrics.clone();
        timed!(metrics, "barrier.consensus_wait", {
            self.drain_in_order(&CONSENSUS_PROPAGATION_ORDER).await
        });
    }

    /// Whether the signal for `role` is pending right now
    pub fn is_pending(&self, role: Role) -> bool {
        self.signal(role).map_or(false, ChangeSignal::is_pending)
    }

    /// Roles whose signal is pending, in consensus propagation order
    pub fn pending(&self) -> Vec<Role> {
        CONSENSUS_PROPAGATION_ORDER
            .iter()
            .copied()
            .filter(|role| self.is_pending(*role))
            .collect()
    }

    /// Metrics this barrier records into
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn drain_in_order(&mut self, order: &[Role]) {
        for role in order {
            self.ready(*role).await;
        }
        // No await past this point, so a cancelled wait never drains a prefix
        for role in order {
            self.take(*role);
        }
    }

    async fn ready(&mut self, role: Role) {
        let Some(signal) = self.signal_mut(role) else {
            return;
        };
        trace!(%role, "waiting for signal");
        if signal.ready().await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn take(&mut self, role: Role) {
        let Some(signal) = self.signal_mut(role) else {
            return;
        };
        if signal.try_take() {
            self.metrics.incr(&format!("barrier.drained.{}", role));
            debug!(%role, "signal drained");
        }
    }

    fn signal(&self, role: Role) -> Option<&ChangeSignal> {
        match role {
            Role::Consensus => Some(&self.consensus),
            Role::TransactionPool => Some(&self.tpool),
            Role::Miner => Some(&self.miner),
            Role::Wallet => Some(&self.wallet),
            Role::Network | Role::Explorer => None,
        }
    }

    fn signal_mut(&mut self, role: Role) -> Option<&mut ChangeSignal> {
        match role {
            Role::Consensus => Some(&mut self.consensus),
            Role::TransactionPool => Some(&mut self.tpool),
            Role::Miner => Some(&mut self.miner),
            Role::Wallet => Some(&mut self.wallet),
            Role::Network | Role::Explorer => None,
        }
    }
}
