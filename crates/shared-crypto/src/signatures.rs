//! # Ed25519 Identity Signatures
//!
//! Every peer owns one long-term identity keypair. It signs envelopes,
//! handshake challenges, capability sets and published DHT records.
//!
//! ## Security Properties
//!
//! - Deterministic nonces (no RNG dependency at signing time)
//! - Verification never panics or errors: it yields `false`
//! - Secret scalar is zeroized on drop by `ed25519-dalek`

use crate::encoding::decode_fixed;
use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityPublicKey([u8; 32]);

impl IdentityPublicKey {
    /// Create from bytes, rejecting encodings that are not curve points.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Parse from a lowercase hex string.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(decode_fixed::<32>(input)?)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature. Returns `false` on any failure.
    pub fn verify(&self, message: &[u8], signature: &IdentitySignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityPublicKey({}..)", &self.to_hex()[..16])
    }
}

impl Serialize for IdentityPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdentitySignature([u8; 64]);

impl IdentitySignature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse from a lowercase hex string.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_fixed::<64>(input)?))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Hex form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for IdentitySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentitySignature({}..)", &self.to_hex()[..16])
    }
}

impl Serialize for IdentitySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentitySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 identity keypair.
///
/// Read-only once constructed; share it behind an `Arc`.
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Get public key.
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message (deterministic - no RNG needed).
    pub fn sign(&self, message: &[u8]) -> IdentitySignature {
        IdentitySignature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = IdentityKeyPair::generate();
        let signature = keypair.sign(b"Hello, Ed25519!");

        assert!(keypair.public_key().verify(b"Hello, Ed25519!", &signature));
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = IdentityKeyPair::generate();
        let signature = keypair.sign(b"message1");

        assert!(!keypair.public_key().verify(b"message2", &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = IdentityKeyPair::generate();
        let keypair2 = IdentityKeyPair::generate();
        let signature = keypair1.sign(b"test");

        assert!(!keypair2.public_key().verify(b"test", &signature));
    }

    #[test]
    fn test_garbage_signature_is_false_not_panic() {
        let keypair = IdentityKeyPair::generate();
        let garbage = IdentitySignature::from_bytes([0xFF; 64]);

        assert!(!keypair.public_key().verify(b"anything", &garbage));
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = IdentityKeyPair::from_seed([0xAB; 32]);

        let sig1 = keypair.sign(b"deterministic test");
        let sig2 = keypair.sign(b"deterministic test");

        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_public_key_serde_is_hex() {
        let keypair = IdentityKeyPair::from_seed([7u8; 32]);
        let pk = keypair.public_key();

        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));

        let back: IdentityPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }
}
