// Shared Ledger - The node's single ledger behind one exclusion lock
//
// Every read that drives a decision and every write happens inside one lock
// scope. The lock is never held across channel I/O.

use crate::ledger::block::Block;
use crate::ledger::chain::{ApplyOutcome, Ledger, LedgerError};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Cloneable handle to the node's ledger
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
    changes: Arc<watch::Sender<u64>>,
    verify_remote: bool,
}

impl SharedLedger {
    /// Wrap a ledger; longer remote candidates are adopted on length alone
    pub fn new(ledger: Ledger) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ledger)),
            changes: Arc::new(changes),
            verify_remote: false,
        }
    }

    /// Start from a ledger holding only `genesis`
    pub fn with_genesis(genesis: Block) -> Self {
        Self::new(Ledger::new(genesis))
    }

    /// Toggle link verification of longer remote chains
    pub fn with_remote_verification(mut self, verify: bool) -> Self {
        self.verify_remote = verify;
        self
    }

    pub fn verifies_remote(&self) -> bool {
        self.verify_remote
    }

    /// Current chain length
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Copy of the current chain
    pub async fn snapshot(&self) -> Ledger {
        self.inner.lock().await.clone()
    }

    /// Copy of the current tip
    pub async fn tip(&self) -> Block {
        self.inner.lock().await.tip().clone()
    }

    /// Append `block` iff it is valid against the tip at the time of locking
    pub async fn try_append(&self, block: Block) -> Result<usize, LedgerError> {
        let new_len = {
            let mut ledger = self.inner.lock().await;
            ledger.append(block)?;
            ledger.len()
        };
        self.notify();
        Ok(new_len)
    }

    /// Offer a remote chain; replaces the local one only if strictly longer
    ///
    /// The length comparison and the replacement happen under one lock.
    pub async fn apply_candidate(&self, candidate: Vec<Block>) -> ApplyOutcome {
        let outcome = {
            let mut ledger = self.inner.lock().await;
            ledger.apply_candidate(candidate, self.verify_remote)
        };
        if outcome.is_replaced() {
            self.notify();
        }
        outcome
    }

    /// Receiver that observes a new value after every mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}
