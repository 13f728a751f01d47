//! # X25519 Ephemeral Key Exchange
//!
//! One [`EphemeralKeyPair`] per handshake. Its secret is zeroized on drop,
//! which is what gives a torn-down session forward secrecy.

use crate::encoding::decode_fixed;
use crate::CryptoError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangePublicKey([u8; 32]);

impl ExchangePublicKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ExchangePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExchangePublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for ExchangePublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ExchangePublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_fixed::<32>(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Raw Diffie-Hellman output. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
    #[zeroize(skip)]
    contributory: bool,
}

impl SharedSecret {
    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// `false` when the peer supplied a low-order point.
    pub fn is_contributory(&self) -> bool {
        self.contributory
    }

    /// Reject low-order results.
    pub fn ensure_contributory(&self) -> Result<(), CryptoError> {
        if self.contributory {
            Ok(())
        } else {
            Err(CryptoError::WeakSharedSecret)
        }
    }
}

/// Single-use X25519 keypair.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: ExchangePublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = ExchangePublicKey(PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    /// Get public key.
    pub fn public_key(&self) -> ExchangePublicKey {
        self.public
    }

    /// Compute the shared secret with a peer's public key.
    pub fn diffie_hellman(&self, peer: &ExchangePublicKey) -> SharedSecret {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer.0));
        SharedSecret {
            contributory: shared.was_contributory(),
            bytes: shared.to_bytes(),
        }
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
