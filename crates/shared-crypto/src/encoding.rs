//! Hex helpers for fixed-size byte fields.
//!
//! Keys, signatures and nonces travel inside JSON envelopes, so they are
//! serialized as lowercase hex strings rather than integer arrays.

use crate::CryptoError;

/// Decode a hex string into exactly `N` bytes.
pub fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(input).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    bytes.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
        expected: N,
        actual: v.len(),
    })
}

/// `#[serde(with = "shared_crypto::encoding::hex_bytes")]` for `Vec<u8>` fields.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize bytes from a hex string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "shared_crypto::encoding::hex_array")]` for `[u8; N]` fields.
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed array as a hex string.
    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a fixed array from a hex string of the exact length.
    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_fixed::<N>(&s).map_err(serde::de::Error::custom)
    }
}
