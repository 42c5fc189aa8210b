// Producer - Local block production
//
// A block is built against the tip observed at one moment and appended only
// if that tip is still current when the lock is taken again. If a remote
// replacement raced in, the block is dropped, not retried.

use crate::ledger::{short_hash, Block, LedgerError, SharedLedger};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one production attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// The block extended the tip
    Appended(Block),
    /// The tip changed between construction and append
    Dropped { attempted: Block, reason: LedgerError },
}

impl ProduceOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, ProduceOutcome::Appended(_))
    }
}

/// Build a block carrying `data` on the current tip and try to append it
pub async fn produce_block(ledger: &SharedLedger, data: i64) -> ProduceOutcome {
    let tip = ledger.tip().await;
    let block = Block::next(&tip, data);

    match ledger.try_append(block.clone()).await {
        Ok(len) => {
            info!(index = block.index(), data, len, hash = short_hash(block.hash()), "Appended local block");
            ProduceOutcome::Appended(block)
        }
        Err(reason) => {
            warn!(index = block.index(), error = %reason, "Tip changed during production, block dropped");
            ProduceOutcome::Dropped {
                attempted: block,
                reason,
            }
        }
    }
}

/// Drives local production from a timer or a line source
#[derive(Clone, Debug)]
pub struct BlockProducer {
    ledger: SharedLedger,
}

impl BlockProducer {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    /// Append an increasing counter every `interval` until cancelled
    ///
    /// Returns the number of blocks appended.
    pub async fn run_counter(&self, interval: Duration, cancel: &CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // The first tick completes immediately; production starts one interval in
        ticker.tick().await;

        let mut counter: i64 = 0;
        let mut appended = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            counter += 1;
            if produce_block(&self.ledger, counter).await.is_appended() {
                appended += 1;
            }
        }
        appended
    }

    /// Treat every integer line of `source` as a block payload
    ///
    /// Blank lines are skipped and other lines are logged and ignored. Stops
    /// at end of input or on cancellation; returns the number of blocks appended.
    pub async fn run_lines<R>(&self, source: R, cancel: &CancellationToken) -> u64
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = source.lines();
        let mut appended = 0;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Block input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Reading block input failed");
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match trimmed.parse::<i64>() {
                Ok(data) => {
                    if produce_block(&self.ledger, data).await.is_appended() {
                        appended += 1;
                    }
                }
                Err(e) => warn!(input = trimmed, error = %e, "Ignoring non-integer block input"),
            }
        }

        appended
    }
}
