//! # Shared Crypto - Session and Identity Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Long-term peer identity, envelope signing |
//! | `exchange` | X25519 | Ephemeral handshake key agreement |
//! | `kdf` | HKDF-SHA256, HMAC-SHA256 | Session key derivation, key confirmation |
//! | `symmetric` | XChaCha20-Poly1305 | Authenticated payload encryption |
//! | `hashing` | BLAKE3 | Transcript hashes, chunk checksums, DHT keys |
//!
//! ## Security Properties
//!
//! - **Forward secrecy**: session keys come from ephemeral X25519 secrets that are
//!   zeroized when the owning session is dropped.
//! - **Domain separation**: encryption and authentication keys are expanded from the
//!   same PRK with distinct `info` labels, so neither reveals the other.
//! - **XChaCha20**: 192-bit random nonces, safe to draw per message.
//! - **Non-throwing verification**: [`verify`] returns `bool`; callers branch on it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod errors;
pub mod exchange;
pub mod hashing;
pub mod kdf;
pub mod signatures;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use exchange::{EphemeralKeyPair, ExchangePublicKey, SharedSecret};
pub use hashing::{blake3_hash, hash160, Blake3Hasher, Hash, Hash160};
pub use kdf::{derive_session_keys, key_confirmation, verify_key_confirmation, SessionKeys};
pub use signatures::{IdentityKeyPair, IdentityPublicKey, IdentitySignature};
pub use symmetric::{aead_decrypt, aead_encrypt, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generate a fresh long-term Ed25519 identity keypair.
pub fn generate_identity_keypair() -> IdentityKeyPair {
    IdentityKeyPair::generate()
}

/// Generate a fresh single-session X25519 key-exchange keypair.
pub fn generate_ephemeral_keypair() -> EphemeralKeyPair {
    EphemeralKeyPair::generate()
}

/// Sign `bytes` with the identity key.
pub fn sign(keypair: &IdentityKeyPair, bytes: &[u8]) -> IdentitySignature {
    keypair.sign(bytes)
}

/// Verify `signature` over `bytes`.
///
/// Never fails loudly: malformed keys and bad signatures both return `false`.
pub fn verify(public_key: &IdentityPublicKey, bytes: &[u8], signature: &IdentitySignature) -> bool {
    public_key.verify(bytes, signature)
}
