//! # BLAKE3 Hashing
//!
//! Used for handshake transcripts, chunk checksums, peer ids and DHT keys.

use blake3::Hasher;

/// BLAKE3 hash output (256-bit).
pub type Hash = [u8; 32];

/// Truncated 160-bit digest, the Kademlia key width.
pub type Hash160 = [u8; 20];

/// Stateful BLAKE3 hasher.
pub struct Blake3Hasher {
    inner: Hasher,
}

impl Blake3Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Hasher::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Append a length-prefixed field so concatenations stay unambiguous.
    pub fn update_framed(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(&(data.len() as u64).to_be_bytes());
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(&self) -> Hash {
        let hash = self.inner.finalize();
        *hash.as_bytes()
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash data with BLAKE3 (one-shot).
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// First 20 bytes of the BLAKE3 digest of `data`.
pub fn hash160(data: &[u8]) -> Hash160 {
    let full = blake3_hash(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&full[..20]);
    out
}
