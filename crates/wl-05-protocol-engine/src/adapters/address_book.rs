//! Address book backed by a plain map.

use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::{PeerAddress, PeerId};

use crate::ports::AddressBook;

/// Peer addresses known up front or learned by the caller.
#[derive(Debug, Default)]
pub struct StaticAddressBook {
    entries: DashMap<PeerId, PeerAddress>,
}

impl StaticAddressBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) where `peer` can be reached.
    pub fn insert(&self, peer: PeerId, address: PeerAddress) {
        self.entries.insert(peer, address);
    }

    /// Forget `peer`.
    pub fn remove(&self, peer: &PeerId) -> Option<PeerAddress> {
        self.entries.remove(peer).map(|(_, address)| address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl AddressBook for StaticAddressBook {
    async fn resolve(&self, peer: &PeerId) -> Option<PeerAddress> {
        self.entries.get(peer).map(|e| e.value().clone())
    }
}
