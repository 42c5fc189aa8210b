// Block - One hash-linked unit of the ledger
//
// A block's hash covers (index, timestamp, data, previous_hash) and is fixed
// at construction. Validation is a pure predicate against the predecessor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A single block in the ledger
///
/// Field names follow the wire format: `{index, timestamp, data, hash, previousHash}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, 0 for genesis
    index: u64,
    /// Creation time, opaque beyond equality and display
    timestamp: String,
    /// Application payload
    data: i64,
    /// Digest over the other four fields
    hash: String,
    /// Hash of the preceding block, empty for genesis
    previous_hash: String,
}

impl Block {
    /// Construct a block, computing its hash from the four hashed fields
    pub fn new(index: u64, timestamp: impl Into<String>, data: i64, previous_hash: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        let previous_hash = previous_hash.into();
        let hash = calculate_hash(index, &timestamp, data, &previous_hash);

        Self {
            index,
            timestamp,
            data,
            hash,
            previous_hash,
        }
    }

    /// The genesis block: index 0, data 0, no predecessor
    pub fn genesis(timestamp: impl Into<String>) -> Self {
        Self::new(0, timestamp, 0, "")
    }

    /// Build the successor of `previous` carrying `data`, stamped with the current time
    pub fn next(previous: &Block, data: i64) -> Self {
        Self::new(
            previous.index + 1,
            chrono::Utc::now().to_string(),
            data,
            previous.hash.clone(),
        )
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> i64 {
        self.data
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// Whether this block looks like a genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash.is_empty()
    }

    /// Recompute the hash from the block's fields
    pub fn compute_hash(&self) -> String {
        calculate_hash(self.index, &self.timestamp, self.data, &self.previous_hash)
    }

    /// Whether the stored hash matches the block's fields
    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} data={}", self.index, short_hash(&self.hash), self.data)
    }
}

/// Hex-encoded SHA-256 over `index ++ timestamp ++ data ++ previous_hash`
///
/// Integers are rendered in decimal before hashing.
pub fn calculate_hash(index: u64, timestamp: &str, data: i64, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(data.to_string().as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Construct a block with a freshly computed hash
pub fn new_block(index: u64, timestamp: &str, data: i64, previous_hash: &str) -> Block {
    Block::new(index, timestamp, data, previous_hash)
}

/// True iff `candidate` directly extends `previous` and its hash is intact
pub fn is_valid(candidate: &Block, previous: &Block) -> bool {
    if previous.index.checked_add(1) != Some(candidate.index) {
        return false;
    }

    if candidate.previous_hash != previous.hash {
        return false;
    }

    candidate.has_valid_hash()
}

/// First 12 hex characters of a hash, for log output
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
