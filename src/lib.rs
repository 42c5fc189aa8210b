// chainsync - A hash-linked ledger kept in sync with one directly dialed peer
//
// ledger:    blocks, the chain, and the node's single locked ledger
// identity:  Ed25519 network identity and PeerId
// transport: listening, dialing, handshake and framed channels
// sync:      reader loop, broadcaster, local block production
// node:      wiring and lifecycle

pub mod config;
pub mod identity;
pub mod ledger;
pub mod node;
pub mod sync;
pub mod transport;

pub use config::{ConfigError, NodeConfig};
pub use node::{Node, NodeError, RunningNode};
