//! Outbound history used to answer gap-fill requests.

use shared_types::MessageType;
use std::collections::VecDeque;

/// One sent message, kept as plaintext so it can be resealed under a fresh
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Sequence number it went out with
    pub seq: u64,
    /// Envelope type
    pub msg_type: MessageType,
    /// Payload before encryption
    pub plaintext: Vec<u8>,
}

/// Bounded ring of the most recent outbound messages of one session.
#[derive(Debug, Clone)]
pub struct RetransmitRing {
    capacity: usize,
    entries: VecDeque<SentMessage>,
}

impl RetransmitRing {
    /// Create an empty ring.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1_024)),
        }
    }

    /// Remember a sent message, dropping the oldest when full.
    pub fn push(&mut self, seq: u64, msg_type: MessageType, plaintext: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(SentMessage {
            seq,
            msg_type,
            plaintext,
        });
    }

    /// Retained messages with `from <= seq <= to`, oldest first.
    pub fn range(&self, from: u64, to: u64) -> Vec<SentMessage> {
        self.entries
            .iter()
            .filter(|m| m.seq >= from && m.seq <= to)
            .cloned()
            .collect()
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
