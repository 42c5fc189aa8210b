// Protocol - Wire format for ledger snapshots
//
// One frame carries the full ledger as a JSON array of blocks:
//   [{"index":0,"timestamp":"...","data":0,"hash":"...","previousHash":""}, ...]

use crate::ledger::{Block, Ledger};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Serialize a ledger to its single-line wire form
pub fn encode_ledger(ledger: &Ledger) -> Result<String, ProtocolError> {
    encode_blocks(ledger.blocks())
}

/// Serialize a block sequence to its single-line wire form
pub fn encode_blocks(blocks: &[Block]) -> Result<String, ProtocolError> {
    serde_json::to_string(blocks).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

/// Parse one frame into a candidate chain
pub fn decode_frame(frame: &str) -> Result<Vec<Block>, ProtocolError> {
    serde_json::from_str(frame).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
}

/// Multi-line rendering for logs
pub fn pretty_ledger(ledger: &Ledger) -> String {
    serde_json::to_string_pretty(ledger.blocks()).unwrap_or_else(|e| format!("<unprintable ledger: {}>", e))
}
