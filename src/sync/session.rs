// Session - One reader and one writer scoped to a channel's lifetime
//
// Both loops run as tasks in one group under a child token. Whichever loop
// ends first cancels the token, which stops the other; both stream halves
// are dropped when the group finishes, closing the connection.

use crate::ledger::SharedLedger;
use crate::sync::broadcaster::{BroadcastConfig, Broadcaster, WriterExit};
use crate::sync::handler::{ReaderExit, ReaderStats, SyncHandler};
use crate::transport::DuplexChannel;
use libp2p::PeerId;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How a session ended
#[derive(Debug)]
pub struct SessionReport {
    pub peer: PeerId,
    pub reader: Option<ReaderExit>,
    pub writer: Option<WriterExit>,
    pub stats: ReaderStats,
}

enum LoopExit {
    Reader(ReaderExit, ReaderStats),
    Writer(WriterExit),
}

/// Runs the sync loops for channels against one shared ledger
#[derive(Clone, Debug)]
pub struct SyncSession {
    ledger: SharedLedger,
    broadcast: BroadcastConfig,
}

impl SyncSession {
    pub fn new(ledger: SharedLedger, broadcast: BroadcastConfig) -> Self {
        Self { ledger, broadcast }
    }

    /// Run both loops on `channel` until either ends or `parent` is cancelled
    pub async fn run(&self, channel: DuplexChannel, parent: &CancellationToken) -> SessionReport {
        let peer = channel.remote_peer();
        let token = parent.child_token();
        let (mut reader, mut writer) = channel.into_split();

        let handler = SyncHandler::new(self.ledger.clone(), peer);
        let broadcaster = Broadcaster::new(self.ledger.clone(), peer, self.broadcast.clone());

        let mut tasks = JoinSet::new();

        let reader_token = token.clone();
        tasks.spawn(async move {
            let (exit, stats) = handler.run(&mut reader, &reader_token).await;
            reader_token.cancel();
            LoopExit::Reader(exit, stats)
        });

        let writer_token = token.clone();
        tasks.spawn(async move {
            let exit = broadcaster.run(&mut writer, &writer_token).await;
            writer_token.cancel();
            LoopExit::Writer(exit)
        });

        let mut report = SessionReport {
            peer,
            reader: None,
            writer: None,
            stats: ReaderStats::default(),
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(LoopExit::Reader(exit, stats)) => {
                    report.reader = Some(exit);
                    report.stats = stats;
                }
                Ok(LoopExit::Writer(exit)) => report.writer = Some(exit),
                Err(e) => {
                    error!(peer = %peer, error = %e, "Session task failed");
                    token.cancel();
                }
            }
        }

        info!(
            peer = %peer,
            frames = report.stats.frames,
            replaced = report.stats.replaced,
            "Synchronization with peer ended"
        );
        report
    }
}
