// Sync module - HOW NODES TALK
// Ledger snapshots over a channel: reader loop, writer loop, local production

mod broadcaster;
mod handler;
mod producer;
mod protocol;
mod session;

pub use broadcaster::{BroadcastConfig, Broadcaster, WriterExit, DEFAULT_BROADCAST_INTERVAL};
pub use handler::{ReaderExit, ReaderStats, SyncHandler};
pub use producer::{produce_block, BlockProducer, ProduceOutcome};
pub use protocol::{decode_frame, encode_blocks, encode_ledger, pretty_ledger, ProtocolError};
pub use session::{SessionReport, SyncSession};
