// Address Book - Known addresses per peer
//
// Entries never expire: an address added here stays until the process exits.

use libp2p::{Multiaddr, PeerId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared map of PeerId -> known addresses
#[derive(Clone, Debug, Default)]
pub struct AddressBook {
    entries: Arc<RwLock<HashMap<PeerId, Vec<Multiaddr>>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record addresses for `peer_id`, skipping ones already known
    pub fn add_addrs(&self, peer_id: PeerId, addrs: impl IntoIterator<Item = Multiaddr>) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let known = entries.entry(peer_id).or_default();
        for addr in addrs {
            if !known.contains(&addr) {
                known.push(addr);
            }
        }
    }

    /// Addresses known for `peer_id`, oldest first
    pub fn addrs(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(peer_id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        !self.addrs(peer_id).is_empty()
    }

    /// Number of peers with at least one address
    pub fn peer_count(&self) -> usize {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.values().filter(|addrs| !addrs.is_empty()).count()
    }
}
