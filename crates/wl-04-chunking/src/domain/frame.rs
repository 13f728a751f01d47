//! Chunk frames and payload splitting.

use serde::{Deserialize, Serialize};
use shared_crypto::encoding::{hex_array, hex_bytes};
use shared_crypto::{blake3_hash, Hash};
use shared_types::MessageType;
use uuid::Uuid;

use super::errors::ChunkError;

/// One fragment of a larger payload.
///
/// Carried as the (encrypted) payload of a `CHUNK` envelope. `msg_type` is
/// the type of the original message so the reassembled payload reaches the
/// right handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFrame {
    /// Shared by every chunk of one payload
    pub transfer_id: Uuid,
    /// Zero-based position
    pub index: u32,
    /// Number of chunks in the transfer
    pub total: u32,
    /// BLAKE3 of `data`
    #[serde(with = "hex_array")]
    pub checksum: Hash,
    /// BLAKE3 of the whole payload
    #[serde(with = "hex_array")]
    pub payload_checksum: Hash,
    /// Type of the original message
    pub msg_type: MessageType,
    /// Fragment bytes
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl ChunkFrame {
    /// Check `data` against `checksum`.
    pub fn verify_checksum(&self) -> Result<(), ChunkError> {
        if blake3_hash(&self.data) == self.checksum {
            Ok(())
        } else {
            Err(ChunkError::CorruptChunk {
                transfer_id: self.transfer_id,
                index: self.index,
            })
        }
    }

    /// Header sanity on its own: non-empty and index in range.
    pub fn check_bounds(&self, max_total_chunks: u32) -> Result<(), ChunkError> {
        if self.total == 0 || self.index >= self.total {
            return Err(ChunkError::InconsistentMetadata(format!(
                "index {} of {}",
                self.index, self.total
            )));
        }
        if self.total > max_total_chunks {
            return Err(ChunkError::TooManyChunks {
                total: self.total,
                max: max_total_chunks,
            });
        }
        Ok(())
    }

    /// Serialize for an envelope payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChunkError> {
        serde_json::to_vec(self).map_err(|e| ChunkError::Malformed(e.to_string()))
    }

    /// Parse an envelope payload.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ChunkError> {
        serde_json::from_slice(raw).map_err(|e| ChunkError::Malformed(e.to_string()))
    }
}

/// Split `payload` into frames of at most `chunk_size` bytes.
///
/// # Errors
///
/// `TooManyChunks` if the payload needs more than `max_total_chunks`.
pub fn split_payload(
    msg_type: &MessageType,
    payload: &[u8],
    chunk_size: usize,
    max_total_chunks: u32,
) -> Result<Vec<ChunkFrame>, ChunkError> {
    let chunk_size = chunk_size.max(1);
    let count = payload.len().div_ceil(chunk_size).max(1);
    let total = u32::try_from(count).unwrap_or(u32::MAX);
    if total > max_total_chunks {
        return Err(ChunkError::TooManyChunks {
            total,
            max: max_total_chunks,
        });
    }

    let transfer_id = Uuid::new_v4();
    let payload_checksum = blake3_hash(payload);
    let pieces: Vec<&[u8]> = if payload.is_empty() {
        vec![payload]
    } else {
        payload.chunks(chunk_size).collect()
    };

    Ok(pieces
        .into_iter()
        .zip(0u32..)
        .map(|(data, index)| ChunkFrame {
            transfer_id,
            index,
            total,
            checksum: blake3_hash(data),
            payload_checksum,
            msg_type: msg_type.clone(),
            data: data.to_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_kib_at_eight_kib_is_three_chunks() {
        let payload = vec![7u8; 20 * 1024];
        let frames = split_payload(&MessageType::Data, &payload, 8 * 1024, 4_096).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data.len(), 8 * 1024);
        assert_eq!(frames[2].data.len(), 4 * 1024);
        assert!(frames.iter().all(|f| f.total == 3));
        assert!(frames.iter().all(|f| f.transfer_id == frames[0].transfer_id));
        assert!(frames.iter().all(|f| f.verify_checksum().is_ok()));
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let frames = split_payload(&MessageType::Data, &[1u8; 32], 16, 64).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_over_limit_refused() {
        assert_eq!(
            split_payload(&MessageType::Data, &[0u8; 100], 10, 5),
            Err(ChunkError::TooManyChunks { total: 10, max: 5 })
        );
    }

    #[test]
    fn test_flipped_byte_detected() {
        let mut frame = split_payload(&MessageType::Data, b"abcdef", 4, 8).unwrap().remove(0);
        frame.data[0] ^= 1;
        assert!(matches!(
            frame.verify_checksum(),
            Err(ChunkError::CorruptChunk { index: 0, .. })
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut frame = split_payload(&MessageType::Data, b"abcdef", 4, 8).unwrap().remove(0);
        frame.index = 2;
        assert!(matches!(
            frame.check_bounds(8),
            Err(ChunkError::InconsistentMetadata(_))
        ));
    }
}
