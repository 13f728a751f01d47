//! What the engine hands back, and the bodies of its control messages.

use serde::{Deserialize, Serialize};
use shared_types::{MessageClass, MessageType, PeerId, Timestamp};
use uuid::Uuid;
use wl_02_session::SessionState;

/// An application message that cleared every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Authenticated sender
    pub sender: PeerId,
    /// Message type (the original type for reassembled payloads)
    pub msg_type: MessageType,
    /// Session it arrived on
    pub session_id: Uuid,
    /// Sequence number (of the last chunk, for reassembled payloads)
    pub sequence_num: u64,
    /// Sender's envelope timestamp
    pub timestamp: Timestamp,
    /// Transfer id when the payload came in chunks
    pub transfer_id: Option<Uuid>,
    /// Decrypted payload
    pub data: Vec<u8>,
}

/// Outcome of a successful `receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Application data, already dispatched to its handler.
    Message(DecodedMessage),
    /// Handshake message processed.
    Handshake {
        /// Session it advanced
        session_id: Uuid,
        /// State after processing
        state: SessionState,
    },
    /// Chunk buffered; the transfer is not complete yet.
    ChunkPending {
        /// Transfer the chunk belongs to
        transfer_id: Uuid,
        /// Chunks held
        received: u32,
        /// Chunks expected
        total: u32,
    },
    /// Chunk for a transfer that already ended.
    ChunkDiscarded,
    /// Heartbeat, gap-fill, rate-limit notice or teardown handled.
    Control(MessageType),
}

/// Proof that `send` handed every frame to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Session used
    pub session_id: Uuid,
    /// First sequence number consumed
    pub first_seq: u64,
    /// Last sequence number consumed
    pub last_seq: u64,
    /// Number of chunks, zero if sent whole
    pub chunks: u32,
}

/// Body of `GAP_FILL`: resend `from..=to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFillRequest {
    /// First missing sequence number
    pub from: u64,
    /// Last sequence number wanted
    pub to: u64,
}

/// Body of `RATE_LIMITED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitedNotice {
    /// Class that ran dry
    pub class: MessageClass,
    /// Suggested wait before sending that class again
    pub retry_after_ms: u64,
}

/// Body of `TEARDOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownNotice {
    /// Free-form reason, for logs
    pub reason: String,
}
