//! One in-progress reassembly.

use shared_crypto::{blake3_hash, Hash};
use shared_types::{MessageType, Timestamp};
use uuid::Uuid;

use super::errors::ChunkError;
use super::frame::ChunkFrame;

/// A payload put back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    /// Transfer that produced it
    pub transfer_id: Uuid,
    /// Type of the original message
    pub msg_type: MessageType,
    /// The payload
    pub data: Vec<u8>,
}

/// Slots for every index of one transfer, filled in any order.
#[derive(Debug, Clone)]
pub struct ChunkAssembly {
    transfer_id: Uuid,
    msg_type: MessageType,
    payload_checksum: Hash,
    slots: Vec<Option<ChunkFrame>>,
    received: u32,
    expires_at: Timestamp,
}

impl ChunkAssembly {
    /// Start an assembly shaped by its first frame.
    pub fn new(first: &ChunkFrame, expires_at: Timestamp) -> Self {
        Self {
            transfer_id: first.transfer_id,
            msg_type: first.msg_type.clone(),
            payload_checksum: first.payload_checksum,
            slots: vec![None; first.total as usize],
            received: 0,
            expires_at,
        }
    }

    /// Transfer id
    pub fn transfer_id(&self) -> Uuid {
        self.transfer_id
    }

    /// Chunks held so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Chunks expected.
    pub fn total(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Deadline for the last chunk.
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// `true` once `now` is past the deadline.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// `true` when every index is present.
    pub fn is_complete(&self) -> bool {
        self.received as usize == self.slots.len()
    }

    /// Place a frame whose own checksum already verified.
    ///
    /// A repeat of a held index is accepted when identical and ignored.
    ///
    /// # Errors
    ///
    /// `InconsistentMetadata` when the frame's header disagrees with the
    /// transfer or with the chunk already held at its index.
    pub fn insert(&mut self, frame: ChunkFrame) -> Result<(), ChunkError> {
        if frame.total != self.total() {
            return Err(ChunkError::InconsistentMetadata(format!(
                "total changed from {} to {}",
                self.total(),
                frame.total
            )));
        }
        if frame.payload_checksum != self.payload_checksum {
            return Err(ChunkError::InconsistentMetadata("payload checksum changed".into()));
        }
        if frame.msg_type != self.msg_type {
            return Err(ChunkError::InconsistentMetadata(format!(
                "message type changed from {} to {}",
                self.msg_type, frame.msg_type
            )));
        }

        let slot = self
            .slots
            .get_mut(frame.index as usize)
            .ok_or_else(|| ChunkError::InconsistentMetadata(format!("index {}", frame.index)))?;
        match slot {
            Some(held) if held.checksum != frame.checksum => Err(ChunkError::InconsistentMetadata(
                format!("chunk {} resent with different data", frame.index),
            )),
            Some(_) => Ok(()),
            None => {
                *slot = Some(frame);
                self.received += 1;
                Ok(())
            }
        }
    }

    /// Join the chunks and check the whole-payload checksum.
    pub fn assemble(self) -> Result<Reassembled, ChunkError> {
        if !self.is_complete() {
            return Err(ChunkError::InconsistentMetadata(format!(
                "{} of {} chunks present",
                self.received,
                self.total()
            )));
        }
        let data: Vec<u8> = self
            .slots
            .into_iter()
            .flatten()
            .flat_map(|frame| frame.data)
            .collect();
        if blake3_hash(&data) != self.payload_checksum {
            return Err(ChunkError::PayloadChecksumMismatch(self.transfer_id));
        }
        Ok(Reassembled {
            transfer_id: self.transfer_id,
            msg_type: self.msg_type,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::split_payload;

    fn frames(payload: &[u8]) -> Vec<ChunkFrame> {
        split_payload(&MessageType::Data, payload, 4, 64).unwrap()
    }

    #[test]
    fn test_reverse_order_reassembles() {
        let payload = b"the quick brown fox".to_vec();
        let frames = frames(&payload);
        let mut assembly = ChunkAssembly::new(&frames[0], Timestamp::from_secs(60));

        for frame in frames.into_iter().rev() {
            assembly.insert(frame).unwrap();
        }
        assert!(assembly.is_complete());
        assert_eq!(assembly.assemble().unwrap().data, payload);
    }

    #[test]
    fn test_identical_duplicate_ignored() {
        let frames = frames(b"abcdefgh");
        let mut assembly = ChunkAssembly::new(&frames[0], Timestamp::from_secs(60));
        assembly.insert(frames[0].clone()).unwrap();
        assembly.insert(frames[0].clone()).unwrap();
        assert_eq!(assembly.received(), 1);
    }

    #[test]
    fn test_changed_total_rejected() {
        let frames = frames(b"abcdefgh");
        let mut assembly = ChunkAssembly::new(&frames[0], Timestamp::from_secs(60));
        let mut odd = frames[1].clone();
        odd.total = 3;
        assert!(matches!(
            assembly.insert(odd),
            Err(ChunkError::InconsistentMetadata(_))
        ));
    }

    #[test]
    fn test_forged_payload_checksum_caught_at_join() {
        let frames = frames(b"abcdefgh");
        let forged = blake3_hash(b"something else");
        let mut assembly = ChunkAssembly::new(
            &ChunkFrame {
                payload_checksum: forged,
                ..frames[0].clone()
            },
            Timestamp::from_secs(60),
        );
        for frame in frames {
            assembly
                .insert(ChunkFrame {
                    payload_checksum: forged,
                    ..frame
                })
                .unwrap();
        }
        assert!(matches!(
            assembly.assemble(),
            Err(ChunkError::PayloadChecksumMismatch(_))
        ));
    }
}
