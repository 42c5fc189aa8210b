// Node Tests
// Full nodes over loopback TCP: startup, dialing, sync and shutdown

use chainsync::config::ConfigError;
use chainsync::ledger::SharedLedger;
use chainsync::sync::produce_block;
use chainsync::{Node, NodeConfig, NodeError};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

fn local_config(seed: u64) -> NodeConfig {
    NodeConfig::new()
        .with_listen_host("127.0.0.1")
        .with_listen_port(0)
        .with_seed(seed)
        .with_broadcast_interval(Duration::from_millis(50))
}

async fn wait_for_len(ledger: &SharedLedger, len: usize) {
    timeout(WAIT, async {
        while ledger.len().await < len {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("ledger never reached length {}", len));
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn test_missing_port_fails_construction() {
    let result = Node::new(NodeConfig::new());

    assert!(matches!(result, Err(NodeError::Config(ConfigError::MissingListenPort))));
}

#[test]
fn test_seeded_identity_is_stable() {
    let a = Node::new(local_config(5)).unwrap();
    let b = Node::new(local_config(5)).unwrap();
    let c = Node::new(local_config(6)).unwrap();

    assert_eq!(a.peer_id(), b.peer_id());
    assert_ne!(a.peer_id(), c.peer_id());
}

#[tokio::test]
async fn test_new_node_has_genesis_only() {
    let node = Node::new(local_config(1)).unwrap();
    let ledger = node.ledger();

    assert_eq!(ledger.len().await, 1);
    assert!(ledger.tip().await.is_genesis());
    assert!(!ledger.verifies_remote());
}

#[test]
fn test_chain_verification_is_opt_in() {
    let node = Node::new(local_config(8).with_verify_remote_chains(true)).unwrap();

    assert!(node.ledger().verifies_remote());
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_start_reports_dialable_address() {
    let node = Node::new(local_config(2)).unwrap();
    let cancel = CancellationToken::new();

    let running = node.start(cancel).await.unwrap();
    let addr = running.listen_addrs()[0].to_string();

    assert_ne!(running.local_addr().port(), 0);
    assert!(addr.starts_with("/ip4/127.0.0.1/tcp/"));
    assert!(addr.ends_with(&format!("/p2p/{}", node.peer_id())));

    timeout(WAIT, running.shutdown()).await.unwrap();
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let node = Node::new(local_config(3).with_listen_port(port)).unwrap();

    let result = node.start(CancellationToken::new()).await;

    assert!(matches!(result, Err(NodeError::Transport(_))));
}

#[tokio::test]
async fn test_unreachable_target_keeps_node_running() {
    let missing = chainsync::identity::NodeIdentity::from_seed(77).unwrap().peer_id();
    let config = local_config(4).with_target(Some(format!("/ip4/127.0.0.1/tcp/1/p2p/{}", missing)));
    let node = Node::new(config).unwrap();

    let running = node.start(CancellationToken::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Local production still works after the failed dial
    assert!(produce_block(&node.ledger(), 1).await.is_appended());
    timeout(WAIT, running.shutdown()).await.unwrap();
}

// ============================================================================
// TWO-NODE SYNC
// ============================================================================

async fn two_node_sync(secure: bool) {
    let a = Node::new(local_config(10).with_secure(secure)).unwrap();
    for data in 1..=3 {
        assert!(produce_block(&a.ledger(), data).await.is_appended());
    }

    let cancel = CancellationToken::new();
    let running_a = a.start(cancel.clone()).await.unwrap();
    let target = running_a.listen_addrs()[0].to_string();

    let b = Node::new(local_config(11).with_secure(secure).with_target(Some(target))).unwrap();
    let running_b = b.start(cancel.clone()).await.unwrap();

    wait_for_len(&b.ledger(), 4).await;
    assert_eq!(b.ledger().snapshot().await, a.ledger().snapshot().await);

    // Only the dialer learns an address; inbound source ports are not dialable
    assert_eq!(b.address_book().addrs(&a.peer_id()).len(), 1);
    assert_eq!(a.address_book().peer_count(), 0);

    // The dialer's blocks flow back over the same channel
    assert!(produce_block(&b.ledger(), 50).await.is_appended());
    wait_for_len(&a.ledger(), 5).await;
    assert_eq!(a.ledger().snapshot().await, b.ledger().snapshot().await);

    cancel.cancel();
    timeout(WAIT, running_a.shutdown()).await.unwrap();
    timeout(WAIT, running_b.shutdown()).await.unwrap();
}

#[tokio::test]
async fn test_two_nodes_converge() {
    two_node_sync(false).await;
}

#[tokio::test]
async fn test_two_nodes_converge_secure() {
    two_node_sync(true).await;
}

#[tokio::test]
async fn test_counter_production_reaches_peer() {
    let a = Node::new(local_config(20).with_produce_interval(Some(Duration::from_millis(30)))).unwrap();
    let cancel = CancellationToken::new();
    let running_a = a.start(cancel.clone()).await.unwrap();
    let target = running_a.listen_addrs()[0].to_string();

    let b = Node::new(local_config(21).with_target(Some(target))).unwrap();
    let running_b = b.start(cancel.clone()).await.unwrap();

    wait_for_len(&b.ledger(), 4).await;
    let snapshot = b.ledger().snapshot().await;
    assert!(snapshot.validate().is_ok());
    assert_eq!(snapshot.blocks()[1].data(), 1);

    cancel.cancel();
    timeout(WAIT, running_a.shutdown()).await.unwrap();
    timeout(WAIT, running_b.shutdown()).await.unwrap();
}

#[tokio::test]
async fn test_run_returns_after_cancel() {
    let node = Node::new(local_config(30)).unwrap();
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    timeout(WAIT, node.run(cancel)).await.unwrap().unwrap();
}
