//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication tag did not verify, or the ciphertext is malformed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// The key used has passed its expiry.
    #[error("Key expired at {expired_at_ms} (now {now_ms})")]
    ExpiredKey {
        /// Expiry instant in Unix milliseconds
        expired_at_ms: u64,
        /// Instant of the attempted use in Unix milliseconds
        now_ms: u64,
    },

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Key exchange produced a non-contributory (all-zero) secret.
    #[error("Key exchange produced a low-order shared secret")]
    WeakSharedSecret,

    /// HKDF expansion failed
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Hex or length decoding failed
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}
