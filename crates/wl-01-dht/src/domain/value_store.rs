//! Local value storage.
//!
//! A concurrent map from key to [`DhtValue`]. Writes keep whichever copy
//! has the newest `last_seen`; reads never return an expired value.
//!
//! A live entry is pinned to the key that signed it: until it expires,
//! only the same signer can replace it.

use super::entities::{DhtValue, NodeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared_types::Timestamp;
use std::time::Duration;

/// Outcome of a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Written (new key, or newer than the stored copy).
    Stored,
    /// An equally new or newer copy is already held.
    Unchanged,
    /// Value already expired on arrival.
    Expired,
    /// Store is at capacity.
    Full,
    /// A live copy signed by a different key is held.
    KeyMismatch,
}

/// Key/value store with TTL.
#[derive(Debug)]
pub struct ValueStore {
    values: DashMap<NodeId, DhtValue>,
    max_ttl: Duration,
    max_values: usize,
}

impl ValueStore {
    /// Create an empty store.
    pub fn new(max_ttl: Duration, max_values: usize) -> Self {
        Self {
            values: DashMap::new(),
            max_ttl,
            max_values,
        }
    }

    /// Write `value` under `key`, clamping its TTL.
    pub fn put(&self, key: NodeId, mut value: DhtValue, now: Timestamp) -> StoreOutcome {
        value.ttl_secs = value.ttl_secs.min(self.max_ttl.as_secs());
        if value.is_expired(now) {
            return StoreOutcome::Expired;
        }

        if !self.values.contains_key(&key) && self.values.len() >= self.max_values {
            return StoreOutcome::Full;
        }

        match self.values.entry(key) {
            Entry::Occupied(mut slot) => {
                let live = !slot.get().is_expired(now);
                if live && slot.get().public_key != value.public_key {
                    StoreOutcome::KeyMismatch
                } else if live && slot.get().last_seen >= value.last_seen {
                    StoreOutcome::Unchanged
                } else {
                    slot.insert(value);
                    StoreOutcome::Stored
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
                StoreOutcome::Stored
            }
        }
    }

    /// Non-expired value under `key`.
    pub fn get(&self, key: &NodeId, now: Timestamp) -> Option<DhtValue> {
        self.values
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.value().clone())
    }

    /// Delete every expired value. Returns how many were removed.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        let before = self.values.len();
        self.values.retain(|_, v| !v.is_expired(now));
        before.saturating_sub(self.values.len())
    }

    /// Number of stored values, expired or not.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::IdentityKeyPair;
    use shared_types::PeerAddress;

    fn value(last_seen_secs: u64, ttl_secs: u64) -> DhtValue {
        signed_by(3, last_seen_secs, ttl_secs)
    }

    fn signed_by(seed: u8, last_seen_secs: u64, ttl_secs: u64) -> DhtValue {
        DhtValue {
            entity_id: "svc".into(),
            addresses: vec![PeerAddress::new(format!("mem://svc-{seed}"))],
            public_key: IdentityKeyPair::from_seed([seed; 32]).public_key(),
            capabilities: vec![],
            last_seen: Timestamp::from_secs(last_seen_secs),
            ttl_secs,
            signature: None,
        }
    }

    fn store() -> ValueStore {
        ValueStore::new(Duration::from_secs(86_400), 4)
    }

    #[test]
    fn test_found_before_ttl_not_after() {
        let store = store();
        let key = NodeId::random();
        store.put(key, value(1_000, 60), Timestamp::from_secs(1_000));

        assert!(store.get(&key, Timestamp::from_secs(1_060)).is_some());
        assert!(store.get(&key, Timestamp::from_secs(1_061)).is_none());
    }

    #[test]
    fn test_newest_last_seen_wins() {
        let store = store();
        let key = NodeId::random();
        let now = Timestamp::from_secs(2_000);

        assert_eq!(store.put(key, value(1_500, 3_600), now), StoreOutcome::Stored);
        assert_eq!(store.put(key, value(1_400, 3_600), now), StoreOutcome::Unchanged);
        assert_eq!(store.put(key, value(1_600, 3_600), now), StoreOutcome::Stored);

        assert_eq!(
            store.get(&key, now).unwrap().last_seen,
            Timestamp::from_secs(1_600)
        );
    }

    #[test]
    fn test_live_entry_pinned_to_its_key() {
        let store = store();
        let key = NodeId::random();
        let now = Timestamp::from_secs(2_000);

        assert_eq!(store.put(key, signed_by(3, 1_500, 3_600), now), StoreOutcome::Stored);
        assert_eq!(
            store.put(key, signed_by(4, 1_501, 3_600), now),
            StoreOutcome::KeyMismatch
        );
        assert_eq!(
            store.get(&key, now).unwrap().addresses,
            vec![PeerAddress::new("mem://svc-3")]
        );
    }

    #[test]
    fn test_expired_entry_can_change_hands() {
        let store = store();
        let key = NodeId::random();

        store.put(key, signed_by(3, 1_000, 60), Timestamp::from_secs(1_000));
        let later = Timestamp::from_secs(1_100);
        assert_eq!(store.put(key, signed_by(4, 1_100, 60), later), StoreOutcome::Stored);
        assert_eq!(
            store.get(&key, later).unwrap().public_key,
            IdentityKeyPair::from_seed([4; 32]).public_key()
        );
    }

    #[test]
    fn test_ttl_clamped() {
        let store = ValueStore::new(Duration::from_secs(100), 4);
        let key = NodeId::random();
        store.put(key, value(0, 1_000_000), Timestamp::from_secs(0));

        assert_eq!(store.get(&key, Timestamp::from_secs(0)).unwrap().ttl_secs, 100);
        assert!(store.get(&key, Timestamp::from_secs(101)).is_none());
    }

    #[test]
    fn test_expired_on_arrival_rejected() {
        let store = store();
        assert_eq!(
            store.put(NodeId::random(), value(0, 10), Timestamp::from_secs(11)),
            StoreOutcome::Expired
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let store = store();
        let now = Timestamp::from_secs(0);
        for _ in 0..4 {
            assert_eq!(store.put(NodeId::random(), value(0, 60), now), StoreOutcome::Stored);
        }
        assert_eq!(store.put(NodeId::random(), value(0, 60), now), StoreOutcome::Full);
    }

    #[test]
    fn test_purge_expired() {
        let store = store();
        let now = Timestamp::from_secs(0);
        store.put(NodeId::random(), value(0, 10), now);
        store.put(NodeId::random(), value(0, 100), now);

        assert_eq!(store.purge_expired(Timestamp::from_secs(50)), 1);
        assert_eq!(store.len(), 1);
    }
}
