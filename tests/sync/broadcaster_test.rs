// Broadcaster Tests
// The writer loop: cadence, change-triggered sends and idempotence

use chainsync::identity::NodeIdentity;
use chainsync::ledger::{Block, SharedLedger};
use chainsync::sync::{decode_frame, produce_block, BroadcastConfig, Broadcaster, WriterExit};
use chainsync::transport::{FrameReader, FrameWriter};
use std::time::Duration;
use tokio::io::duplex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn genesis() -> Block {
    Block::genesis("genesis")
}

fn broadcaster(ledger: &SharedLedger, config: BroadcastConfig) -> Broadcaster {
    Broadcaster::new(ledger.clone(), NodeIdentity::from_seed(31).unwrap().peer_id(), config)
}

#[test]
fn test_broadcast_config_defaults() {
    let config = BroadcastConfig::default();

    assert_eq!(config.interval, Duration::from_secs(5));
    assert!(config.on_change);

    let custom = BroadcastConfig::new()
        .with_interval(Duration::from_millis(250))
        .with_on_change(false);
    assert_eq!(custom.interval, Duration::from_millis(250));
    assert!(!custom.on_change);
}

#[tokio::test]
async fn test_broadcast_once_sends_full_ledger() {
    let ledger = SharedLedger::with_genesis(genesis());
    produce_block(&ledger, 5).await;
    let (a, b) = duplex(64 * 1024);
    let mut writer = FrameWriter::new(Box::new(a));
    let mut reader = FrameReader::new(Box::new(b));

    let sent = broadcaster(&ledger, BroadcastConfig::new())
        .broadcast_once(&mut writer)
        .await
        .unwrap();

    let frame = reader.next_frame().await.unwrap().unwrap();
    assert_eq!(sent, 2);
    assert_eq!(decode_frame(&frame).unwrap(), ledger.snapshot().await.blocks());
}

#[tokio::test]
async fn test_unchanged_ledger_broadcasts_identical_frames() {
    let ledger = SharedLedger::with_genesis(genesis());
    produce_block(&ledger, 9).await;
    let (a, b) = duplex(64 * 1024);
    let mut writer = FrameWriter::new(Box::new(a));
    let mut reader = FrameReader::new(Box::new(b));
    let broadcaster = broadcaster(&ledger, BroadcastConfig::new());

    broadcaster.broadcast_once(&mut writer).await.unwrap();
    broadcaster.broadcast_once(&mut writer).await.unwrap();

    let first = reader.next_frame().await.unwrap().unwrap();
    let second = reader.next_frame().await.unwrap().unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_first_broadcast_is_immediate() {
    let ledger = SharedLedger::with_genesis(genesis());
    let (a, b) = duplex(64 * 1024);
    let mut writer = FrameWriter::new(Box::new(a));
    let mut reader = FrameReader::new(Box::new(b));
    let cancel = CancellationToken::new();

    let broadcaster = broadcaster(&ledger, BroadcastConfig::new().with_interval(Duration::from_secs(3600)));
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { broadcaster.run(&mut writer, &cancel).await }
    });

    let frame = timeout(WAIT, reader.next_frame()).await.unwrap().unwrap().unwrap();
    assert_eq!(decode_frame(&frame).unwrap(), vec![genesis()]);

    cancel.cancel();
    let exit = timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(exit, WriterExit::Cancelled));
    // The writer closes its direction on exit
    assert_eq!(timeout(WAIT, reader.next_frame()).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_local_change_triggers_broadcast() {
    let ledger = SharedLedger::with_genesis(genesis());
    let (a, b) = duplex(64 * 1024);
    let mut writer = FrameWriter::new(Box::new(a));
    let mut reader = FrameReader::new(Box::new(b));
    let cancel = CancellationToken::new();

    let broadcaster = broadcaster(&ledger, BroadcastConfig::new().with_interval(Duration::from_secs(3600)));
    tokio::spawn({
        let cancel = cancel.clone();
        async move { broadcaster.run(&mut writer, &cancel).await }
    });

    let initial = timeout(WAIT, reader.next_frame()).await.unwrap().unwrap().unwrap();
    assert_eq!(decode_frame(&initial).unwrap().len(), 1);

    produce_block(&ledger, 77).await;

    let updated = timeout(WAIT, reader.next_frame()).await.unwrap().unwrap().unwrap();
    let blocks = decode_frame(&updated).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].data(), 77);

    cancel.cancel();
}

#[tokio::test]
async fn test_cadence_repeats_without_changes() {
    let ledger = SharedLedger::with_genesis(genesis());
    let (a, b) = duplex(64 * 1024);
    let mut writer = FrameWriter::new(Box::new(a));
    let mut reader = FrameReader::new(Box::new(b));
    let cancel = CancellationToken::new();

    let config = BroadcastConfig::new()
        .with_interval(Duration::from_millis(20))
        .with_on_change(false);
    let broadcaster = broadcaster(&ledger, config);
    tokio::spawn({
        let cancel = cancel.clone();
        async move { broadcaster.run(&mut writer, &cancel).await }
    });

    for _ in 0..3 {
        let frame = timeout(WAIT, reader.next_frame()).await.unwrap().unwrap().unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), vec![genesis()]);
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_write_failure_ends_loop() {
    let ledger = SharedLedger::with_genesis(genesis());
    let (a, b) = duplex(1024);
    drop(b);
    let mut writer = FrameWriter::new(Box::new(a));

    let exit = timeout(
        WAIT,
        broadcaster(&ledger, BroadcastConfig::new()).run(&mut writer, &CancellationToken::new()),
    )
    .await
    .unwrap();

    assert!(matches!(exit, WriterExit::Failed(_)));
}
