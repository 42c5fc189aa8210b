// Broadcaster - The writer loop for one channel
//
// On every cadence tick, and whenever the local ledger changes, snapshot the
// ledger under the lock, release it, then write the frame.

use crate::ledger::SharedLedger;
use crate::sync::protocol::encode_ledger;
use crate::transport::{ChannelError, FrameWriter};
use libp2p::PeerId;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default cadence between full-ledger broadcasts
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// Why a writer loop ended
#[derive(Debug)]
pub enum WriterExit {
    /// Writing failed; the channel is finished
    Failed(ChannelError),
    /// The session was shut down locally
    Cancelled,
}

/// Configuration for one broadcaster
#[derive(Clone, Debug)]
pub struct BroadcastConfig {
    /// Fixed cadence between broadcasts
    pub interval: Duration,
    /// Also broadcast as soon as the local ledger changes
    pub on_change: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_BROADCAST_INTERVAL,
            on_change: true,
        }
    }
}

impl BroadcastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_on_change(mut self, on_change: bool) -> Self {
        self.on_change = on_change;
        self
    }
}

/// Pushes the shared ledger to one peer
#[derive(Clone, Debug)]
pub struct Broadcaster {
    ledger: SharedLedger,
    peer: PeerId,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(ledger: SharedLedger, peer: PeerId, config: BroadcastConfig) -> Self {
        Self { ledger, peer, config }
    }

    /// Snapshot, serialize and send the current ledger once
    pub async fn broadcast_once(&self, writer: &mut FrameWriter) -> Result<usize, ChannelError> {
        let snapshot = self.ledger.snapshot().await;
        let frame = encode_ledger(&snapshot).map_err(|e| ChannelError::EncodeFailed(e.to_string()))?;

        writer.send_frame(&frame).await?;
        debug!(peer = %self.peer, len = snapshot.len(), "Broadcast ledger");
        Ok(snapshot.len())
    }

    /// Broadcast until a write fails or `cancel` fires
    ///
    /// The first tick fires immediately, so a fresh channel receives our
    /// ledger without waiting a full interval.
    pub async fn run(&self, writer: &mut FrameWriter, cancel: &CancellationToken) -> WriterExit {
        let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut changes = self.ledger.subscribe();
        let mut watch_changes = self.config.on_change;

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break WriterExit::Cancelled,
                _ = ticker.tick() => {}
                changed = changes.changed(), if watch_changes => {
                    if changed.is_err() {
                        warn!(peer = %self.peer, "Ledger change notifications ended, falling back to cadence");
                        watch_changes = false;
                        continue;
                    }
                }
            }

            if let Err(e) = self.broadcast_once(writer).await {
                error!(peer = %self.peer, error = %e, "Broadcast failed, closing channel");
                break WriterExit::Failed(e);
            }
        };

        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Channel shutdown after writer exit failed");
        }
        exit
    }
}
