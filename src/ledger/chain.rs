// Ledger - The ordered, hash-linked sequence of blocks held by a node
//
// Mutated two ways: appending a locally produced block to the tip, and
// wholesale replacement by a strictly longer remote chain.

use crate::ledger::block::{is_valid, Block};
use thiserror::Error;

/// Errors from ledger mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Block #{index} does not extend the current tip #{tip}")]
    DoesNotExtendTip { index: u64, tip: u64 },

    #[error("Chain is empty")]
    EmptyChain,

    #[error("Broken link at index {0}")]
    BrokenLink(usize),
}

/// Result of offering a remote chain to the local ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The remote chain was strictly longer and replaced the local one
    Replaced { old_len: usize, new_len: usize },
    /// The remote chain was not longer; nothing changed
    Ignored { local_len: usize, remote_len: usize },
    /// The remote chain was longer but failed verification; nothing changed
    Rejected(LedgerError),
}

impl ApplyOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ApplyOutcome::Replaced { .. })
    }
}

/// The local ledger, always holding at least the genesis block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Ledger {
    /// Create a ledger holding only `genesis`
    pub fn new(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Build a ledger from an existing chain
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, LedgerError> {
        if blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; a ledger keeps its genesis block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// The last block in the chain
    pub fn tip(&self) -> &Block {
        // from_blocks and new both guarantee at least one block
        &self.blocks[self.blocks.len() - 1]
    }

    /// Append `block` if it directly extends the current tip
    pub fn append(&mut self, block: Block) -> Result<(), LedgerError> {
        let tip = self.tip();
        if !is_valid(&block, tip) {
            return Err(LedgerError::DoesNotExtendTip {
                index: block.index(),
                tip: tip.index(),
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Longest-chain-wins against a remote candidate
    ///
    /// A candidate replaces the local chain only if it is strictly longer.
    /// With `verify` set, every link of the candidate must also pass `is_valid`.
    pub fn apply_candidate(&mut self, candidate: Vec<Block>, verify: bool) -> ApplyOutcome {
        let local_len = self.blocks.len();
        let remote_len = candidate.len();

        if remote_len <= local_len {
            return ApplyOutcome::Ignored {
                local_len,
                remote_len,
            };
        }

        if verify {
            if let Err(e) = validate_chain(&candidate) {
                return ApplyOutcome::Rejected(e);
            }
        }

        self.blocks = candidate;
        ApplyOutcome::Replaced {
            old_len: local_len,
            new_len: remote_len,
        }
    }

    /// Check every link of the ledger
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_chain(&self.blocks)
    }
}

/// Verify `is_valid(block[i], block[i-1])` for every `i > 0`
///
/// The first block is not checked against a predecessor.
pub fn validate_chain(blocks: &[Block]) -> Result<(), LedgerError> {
    if blocks.is_empty() {
        return Err(LedgerError::EmptyChain);
    }

    for (i, pair) in blocks.windows(2).enumerate() {
        if !is_valid(&pair[1], &pair[0]) {
            return Err(LedgerError::BrokenLink(i + 1));
        }
    }

    Ok(())
}
