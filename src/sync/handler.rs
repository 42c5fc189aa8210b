// Sync Handler - The reader loop for one channel
//
// Reading -> Applying -> Reading until the channel closes. Each frame is a
// full remote ledger; longest-chain-wins decides whether it replaces ours.
// A malformed frame is logged and skipped, never fatal to the loop.

use crate::ledger::{short_hash, ApplyOutcome, SharedLedger};
use crate::sync::protocol::{decode_frame, pretty_ledger, ProtocolError};
use crate::transport::{ChannelError, FrameReader};
use libp2p::PeerId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a reader loop ended
#[derive(Debug)]
pub enum ReaderExit {
    /// The remote closed the stream
    Closed,
    /// Reading failed; synchronization with this peer is over
    Failed(ChannelError),
    /// The session was shut down locally
    Cancelled,
}

/// Counters for one reader loop
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub frames: u64,
    pub malformed: u64,
    pub replaced: u64,
    pub ignored: u64,
    pub rejected: u64,
}

/// Applies ledger snapshots from one peer to the shared ledger
#[derive(Clone, Debug)]
pub struct SyncHandler {
    ledger: SharedLedger,
    peer: PeerId,
}

impl SyncHandler {
    pub fn new(ledger: SharedLedger, peer: PeerId) -> Self {
        Self { ledger, peer }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Decode one frame and run the conflict-resolution rule on it
    pub async fn handle_frame(&self, frame: &str) -> Result<ApplyOutcome, ProtocolError> {
        let candidate = decode_frame(frame)?;
        let outcome = self.ledger.apply_candidate(candidate).await;

        match &outcome {
            ApplyOutcome::Replaced { old_len, new_len } => {
                let snapshot = self.ledger.snapshot().await;
                info!(
                    peer = %self.peer,
                    old_len,
                    new_len,
                    tip = short_hash(snapshot.tip().hash()),
                    "Replaced local ledger with longer remote chain"
                );
                debug!(peer = %self.peer, "Ledger is now:\n{}", pretty_ledger(&snapshot));
            }
            ApplyOutcome::Ignored { local_len, remote_len } => {
                debug!(peer = %self.peer, local_len, remote_len, "Remote chain not longer, ignored");
            }
            ApplyOutcome::Rejected(reason) => {
                warn!(peer = %self.peer, error = %reason, "Rejected longer remote chain");
            }
        }

        Ok(outcome)
    }

    /// Read frames until the channel closes, fails, or `cancel` fires
    pub async fn run(&self, reader: &mut FrameReader, cancel: &CancellationToken) -> (ReaderExit, ReaderStats) {
        let mut stats = ReaderStats::default();

        let exit = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break ReaderExit::Cancelled,
                next = reader.next_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break ReaderExit::Closed,
                Err(e) if e.is_recoverable() => {
                    stats.malformed += 1;
                    warn!(peer = %self.peer, error = %e, "Discarding malformed frame");
                    continue;
                }
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Channel read failed");
                    break ReaderExit::Failed(e);
                }
            };

            stats.frames += 1;
            match self.handle_frame(&frame).await {
                Ok(ApplyOutcome::Replaced { .. }) => stats.replaced += 1,
                Ok(ApplyOutcome::Ignored { .. }) => stats.ignored += 1,
                Ok(ApplyOutcome::Rejected(_)) => stats.rejected += 1,
                Err(e) => {
                    stats.malformed += 1;
                    warn!(peer = %self.peer, error = %e, "Discarding malformed frame");
                }
            }
        };

        debug!(peer = %self.peer, ?exit, ?stats, "Reader loop ended");
        (exit, stats)
    }
}
