// Ledger module - THE SHARED HISTORY
// Blocks, the hash-linked chain, and the node's locked ledger handle

mod block;
mod chain;
mod shared;

pub use block::{calculate_hash, is_valid, new_block, short_hash, Block};
pub use chain::{validate_chain, ApplyOutcome, Ledger, LedgerError};
pub use shared::SharedLedger;
