//! Core domain entities: node identifiers, node records and stored values.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shared_crypto::encoding::decode_fixed;
use shared_crypto::{
    blake3_hash, hash160, IdentityKeyPair, IdentityPublicKey, IdentitySignature,
};
use shared_types::{canonical_bytes_without, PeerAddress, PeerId, ProtocolError, Timestamp};
use std::fmt;
use std::time::Duration;

/// Width of the identifier space in bits.
pub const ID_BITS: usize = 160;

/// Capability used for the "any capability" registration of an entity.
pub const WILDCARD_CAPABILITY: &str = "*";

/// 160-bit Kademlia identifier for nodes and keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 20]);

impl NodeId {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Random identifier.
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance, compared lexicographically (big-endian).
    pub fn distance(&self, other: &NodeId) -> [u8; 20] {
        let mut out = [0u8; 20];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Random identifier whose distance from `self` falls in bucket `index`:
    /// bit `index` of the distance is the highest one set.
    pub fn random_in_bucket(&self, index: usize) -> NodeId {
        let index = index.min(ID_BITS - 1);
        let mut xor = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut xor);

        // Bit i counts from the least significant end.
        let byte = 19 - index / 8;
        let bit = index % 8;
        for b in xor.iter_mut().take(byte) {
            *b = 0;
        }
        let keep_below = (1u8 << bit).wrapping_sub(1);
        xor[byte] = (xor[byte] & keep_below) | (1u8 << bit);

        let mut out = self.0;
        for (o, x) in out.iter_mut().zip(xor.iter()) {
            *o ^= x;
        }
        NodeId(out)
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_fixed::<20>(&s)
            .map(NodeId)
            .map_err(serde::de::Error::custom)
    }
}

/// DHT key for an entity registration: `hash160(entity_id || blake3(capability))`.
pub fn dht_key(entity_id: &str, capability: &str) -> NodeId {
    let cap_hash = blake3_hash(capability.as_bytes());
    let mut material = Vec::with_capacity(entity_id.len() + cap_hash.len());
    material.extend_from_slice(entity_id.as_bytes());
    material.extend_from_slice(&cap_hash);
    NodeId(hash160(&material))
}

/// What the routing table knows about a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Kademlia identifier.
    pub node_id: NodeId,
    /// Where to reach it.
    pub address: PeerAddress,
    /// Last time we heard from it.
    pub last_seen: Timestamp,
    /// Its Ed25519 identity key.
    pub public_key: IdentityPublicKey,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl NodeInfo {
    /// Create a record seen at `last_seen`.
    pub fn new(
        node_id: NodeId,
        address: PeerAddress,
        public_key: IdentityPublicKey,
        last_seen: Timestamp,
    ) -> Self {
        Self {
            node_id,
            address,
            last_seen,
            public_key,
            capabilities: Vec::new(),
        }
    }

    /// `true` if nothing was heard from the node for longer than `stale_after`.
    pub fn is_stale(&self, now: Timestamp, stale_after: Duration) -> bool {
        now.since(self.last_seen) > stale_after
    }
}

/// A signed entity registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtValue {
    /// Registered entity (a peer id in hex for peers).
    pub entity_id: String,
    /// Addresses the entity can be reached at.
    pub addresses: Vec<PeerAddress>,
    /// Identity key of the entity.
    pub public_key: IdentityPublicKey,
    /// Capabilities the entity offers.
    pub capabilities: Vec<String>,
    /// Publication time; refreshed by republish.
    pub last_seen: Timestamp,
    /// Lifetime in seconds from `last_seen`.
    pub ttl_secs: u64,
    /// Signature by `public_key` over the canonical form minus this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<IdentitySignature>,
}

impl DhtValue {
    /// Instant after which the value is no longer servable.
    pub fn expires_at(&self) -> Timestamp {
        self.last_seen
            .saturating_add(Duration::from_secs(self.ttl_secs))
    }

    /// Servable only while `now - last_seen <= ttl`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at()
    }

    /// Bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        canonical_bytes_without(self, &["signature"])
    }

    /// Sign in place with the entity's identity key.
    pub fn sign(&mut self, keypair: &IdentityKeyPair) -> Result<(), ProtocolError> {
        self.public_key = keypair.public_key();
        let bytes = self.signing_bytes()?;
        self.signature = Some(keypair.sign(&bytes));
        Ok(())
    }

    /// `true` if signed by `public_key`.
    pub fn verify(&self) -> bool {
        let Some(sig) = &self.signature else {
            return false;
        };
        match self.signing_bytes() {
            Ok(bytes) => self.public_key.verify(&bytes, sig),
            Err(_) => false,
        }
    }

    /// `true` if `key` is one this value may be stored under: the wildcard
    /// key or one of its capability keys.
    pub fn matches_key(&self, key: &NodeId) -> bool {
        *key == dht_key(&self.entity_id, WILDCARD_CAPABILITY)
            || self
                .capabilities
                .iter()
                .any(|cap| *key == dht_key(&self.entity_id, cap))
    }

    /// An entity id that parses as a peer id must be owned by `public_key`.
    pub fn owner_matches(&self) -> bool {
        match PeerId::from_hex(&self.entity_id) {
            Ok(peer) => peer.matches(&self.public_key),
            Err(_) => true,
        }
    }

    /// `true` if the value offers `capability`.
    pub fn has_capability(&self, capability: &str) -> bool {
        capability == WILDCARD_CAPABILITY || self.capabilities.iter().any(|c| c == capability)
    }
}
