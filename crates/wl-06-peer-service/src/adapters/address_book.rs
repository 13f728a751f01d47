//! Peer address resolution through the DHT.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use shared_types::{PeerAddress, PeerId, TimeSource, Timestamp};
use tracing::debug;
use wl_01_dht::{dht_key, DhtNode, DhtValue, WILDCARD_CAPABILITY};
use wl_05_protocol_engine::AddressBook;

/// Resolves a peer from a local cache first, then from the DHT entry the
/// peer published under its own id.
///
/// Only entries signed by the key that owns the peer id are believed.
pub struct DhtAddressBook {
    dht: Arc<DhtNode>,
    cache: DashMap<PeerId, (PeerAddress, Timestamp)>,
    ttl: Duration,
    time_source: Arc<dyn TimeSource>,
}

impl DhtAddressBook {
    pub fn new(dht: Arc<DhtNode>, ttl: Duration, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            dht,
            cache: DashMap::new(),
            ttl,
            time_source,
        }
    }

    /// Remember `address` for `peer` without asking the DHT.
    pub fn insert(&self, peer: PeerId, address: PeerAddress) {
        self.cache.insert(peer, (address, self.time_source.now()));
    }

    /// Drop the cached address of `peer`.
    pub fn invalidate(&self, peer: &PeerId) {
        self.cache.remove(peer);
    }

    /// Cached address of `peer`, if still fresh.
    pub fn cached(&self, peer: &PeerId) -> Option<PeerAddress> {
        let now = self.time_source.now();
        self.cache
            .get(peer)
            .filter(|entry| now.since(entry.value().1) < self.ttl)
            .map(|entry| entry.value().0.clone())
    }

    fn usable_address(peer: &PeerId, value: &DhtValue) -> Option<PeerAddress> {
        if value.entity_id != peer.to_hex() || !peer.matches(&value.public_key) || !value.verify() {
            return None;
        }
        value.addresses.first().cloned()
    }
}

#[async_trait]
impl AddressBook for DhtAddressBook {
    async fn resolve(&self, peer: &PeerId) -> Option<PeerAddress> {
        if let Some(address) = self.cached(peer) {
            return Some(address);
        }

        let key = dht_key(&peer.to_hex(), WILDCARD_CAPABILITY);
        let value = match self.dht.find_value(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(peer = ?peer, "peer not registered in the DHT");
                return None;
            }
            Err(err) => {
                debug!(peer = ?peer, error = %err, "DHT lookup failed");
                return None;
            }
        };

        let address = Self::usable_address(peer, &value)?;
        debug!(peer = ?peer, %address, "resolved peer through the DHT");
        self.insert(*peer, address.clone());
        Some(address)
    }
}

impl std::fmt::Debug for DhtAddressBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtAddressBook")
            .field("cached", &self.cache.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
