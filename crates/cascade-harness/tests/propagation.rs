//! End-to-end propagation through a composed node

use cascade_harness::{compose, ComposeConfig, HarnessError, NodeTester, Role, CONSENSUS_DIR};
use cascade_types::{Address, Transaction};
use std::time::Duration;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(10);
const SHORT: Duration = Duration::from_millis(100);

fn counts(tester: &NodeTester) -> Vec<(Role, u64)> {
    Role::CONSTRUCTION_ORDER
        .iter()
        .filter_map(|role| Some((*role, tester.node().processed_count(*role)?)))
        .collect()
}

fn count(tester: &NodeTester, role: Role) -> u64 {
    tester.node().processed_count(role).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accepted_transaction_reaches_miner_and_wallet() {
    let mut tester = NodeTester::new("tx-accept").await.unwrap();
    let before = counts(&tester);

    let tx = Transaction::new(Address::random(), Address::random(), 5, 1, 0);
    let hash = tester.node().tpool().accept_transaction(tx).await.unwrap();
    timeout(DEADLINE, tester.node_mut().await_pool_propagation())
        .await
        .unwrap();

    assert!(tester.node().tpool().contains(&hash));
    for (role, was) in before {
        let now = count(&tester, role);
        match role {
            Role::TransactionPool | Role::Miner | Role::Wallet => {
                assert_eq!(now, was + 1, "{} processed count", role)
            }
            _ => assert_eq!(now, was, "{} should not have reacted", role),
        }
    }
    assert_eq!(tester.node().miner().block_template().transactions.len(), 1);
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mined_block_cascades_through_every_subsystem() {
    let mut tester = NodeTester::new("mine").await.unwrap();

    let tx = Transaction::new(Address::random(), Address::random(), 5, 2, 0);
    tester.node().tpool().accept_transaction(tx).await.unwrap();
    timeout(DEADLINE, tester.node_mut().await_pool_propagation())
        .await
        .unwrap();

    let block = timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();

    let node = tester.node();
    assert_eq!(block.height(), 1);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(node.consensus().height(), 1);
    assert_eq!(node.consensus().tip_hash(), block.hash());
    assert!(node.tpool().is_empty());
    assert_eq!(node.wallet().confirmed_balance(), 52);
    assert_eq!(node.miner().block_template().parent_hash(), block.hash());
    assert_eq!(node.miner().blocks_mined(), 1);
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wallet_send_confirms_in_next_block() {
    let mut tester = NodeTester::new("send").await.unwrap();
    timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tester.node().wallet().confirmed_balance(), 50);

    let recipient = Address::random();
    tester.node().wallet().send(recipient, 10, 0).await.unwrap();
    timeout(DEADLINE, tester.node_mut().await_pool_propagation())
        .await
        .unwrap();

    let wallet = tester.node().wallet();
    assert_eq!(wallet.unconfirmed().outgoing, 10);
    assert_eq!(wallet.spendable(), 40);

    timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();

    let node = tester.node();
    assert_eq!(node.wallet().confirmed_balance(), 90);
    assert_eq!(node.wallet().unconfirmed().outgoing, 0);
    assert_eq!(node.consensus().height(), 2);
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn settled_barrier_blocks_until_next_change() {
    let mut tester = NodeTester::new("settled").await.unwrap();
    timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();

    assert!(timeout(SHORT, tester.node_mut().await_consensus_propagation())
        .await
        .is_err());
    assert!(timeout(SHORT, tester.node_mut().await_pool_propagation())
        .await
        .is_err());
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fresh_subscription_sees_later_change() {
    let mut tester = NodeTester::new("subscribe").await.unwrap();
    let mut explorer = tester.node().subscribe(Role::Explorer).unwrap();
    assert!(tester.node().subscribe(Role::Network).is_none());

    timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();
    timeout(DEADLINE, explorer.wait()).await.unwrap();
    assert_eq!(tester.node().explorer().status().height, 1);
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn testers_are_isolated() {
    let mut first = NodeTester::new("iso-a").await.unwrap();
    let second = NodeTester::new("iso-b").await.unwrap();

    assert_ne!(first.root(), second.root());
    assert_ne!(
        first.node().network().local_addr(),
        second.node().network().local_addr()
    );
    assert_ne!(first.node().wallet().address(), second.node().wallet().address());

    timeout(DEADLINE, first.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.node().consensus().height(), 1);
    assert_eq!(second.node().consensus().height(), 0);
    assert!(second.node().barrier().pending().is_empty());
    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn port_in_use_fails_network_construction() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let result = NodeTester::with_config("port", |config| config.with_listen_addr(addr)).await;
    match result {
        Err(err) => assert_eq!(err.role(), Some(Role::Network)),
        Ok(_) => panic!("bind on a taken port should fail"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unusable_storage_fails_consensus_construction() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONSENSUS_DIR), b"not a directory").unwrap();

    let result = compose(ComposeConfig::new(dir.path())).await;
    match result {
        Err(err @ HarnessError::Consensus(_)) => {
            assert_eq!(err.role(), Some(Role::Consensus))
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("consensus over a file should fail"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_composition_releases_built_subsystems() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join(CONSENSUS_DIR);
    std::fs::write(&blocker, b"not a directory").unwrap();
    assert!(compose(ComposeConfig::new(dir.path())).await.is_err());

    // The network built before the failure was dropped with the error, so
    // its store under the same root opens again without any teardown call.
    std::fs::remove_file(&blocker).unwrap();
    let node = timeout(DEADLINE, async {
        loop {
            match compose(ComposeConfig::new(dir.path())).await {
                Ok(node) => break node,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(node.consensus().height(), 0);
    node.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn metrics_snapshot_reflects_propagation() {
    let mut tester = NodeTester::new("metrics").await.unwrap();
    timeout(DEADLINE, tester.mine_block_and_settle())
        .await
        .unwrap()
        .unwrap();

    let snapshot = tester.node().metrics_snapshot();
    assert_eq!(snapshot.counter("barrier.drained.consensus"), 1);
    assert_eq!(snapshot.counter("barrier.drained.transaction-pool"), 1);
    assert_eq!(snapshot.counter("barrier.drained.wallet"), 1);
    assert_eq!(snapshot.gauges.get("consensus.height"), Some(&1));
    assert_eq!(snapshot.gauges.get("processed.miner"), Some(&1));
    assert_eq!(snapshot.histograms["barrier.consensus_wait"].count, 1);
    assert!(!snapshot.histograms.contains_key("barrier.pool_wait"));
    assert!(snapshot.to_json().unwrap().contains("barrier.consensus_wait"));
    tester.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_reactors() {
    let tester = NodeTester::new("shutdown").await.unwrap();
    let network = tester.node().network().clone();
    let root = tester.root().to_path_buf();

    tester.shutdown().await;
    assert!(network.is_closed());
    assert!(!root.exists());
}
