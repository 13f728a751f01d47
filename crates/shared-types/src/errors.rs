//! # Error Types
//!
//! The error taxonomy shared by the session engine, admission control and
//! discovery. Raw transport failures are classified into
//! [`TransportError`] before they reach a public API.

use crate::time::Timestamp;
use shared_crypto::CryptoError;
use std::time::Duration;
use thiserror::Error;

/// Which replay defence fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    /// Nonce already seen inside the retention window.
    NonceReused,
    /// Timestamp older than the tolerance.
    TimestampTooOld,
    /// Timestamp further ahead than the allowed skew.
    TimestampInFuture,
    /// Sequence number already accepted.
    SequenceReused,
    /// Sequence number behind the replay window.
    SequenceBehindWindow,
}

impl std::fmt::Display for ReplayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NonceReused => "nonce reused",
            Self::TimestampTooOld => "timestamp too old",
            Self::TimestampInFuture => "timestamp in the future",
            Self::SequenceReused => "sequence number reused",
            Self::SequenceBehindWindow => "sequence number behind window",
        };
        f.write_str(s)
    }
}

/// Session protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Envelope version not supported.
    #[error("Unsupported version: received {received}, supported {supported}")]
    InvalidVersion {
        /// Version on the envelope
        received: u16,
        /// Version this node speaks
        supported: u16,
    },

    /// Signature missing, malformed, or not from the claimed sender.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Replay defence rejected the message.
    #[error("Replay detected: {0}")]
    ReplayDetected(ReplayKind),

    /// Session passed its lifetime.
    #[error("Session expired")]
    SessionExpired,

    /// Sequence number too far ahead of the receive window.
    #[error("Sequence error: expected {expected}, received {received}")]
    SequenceError {
        /// Next in-order number
        expected: u64,
        /// Number on the envelope
        received: u64,
    },

    /// AEAD tag did not verify.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Challenge response arrived after the challenge lifetime.
    #[error("Challenge expired")]
    ChallengeExpired,

    /// Challenge response signature does not verify.
    #[error("Challenge invalid")]
    ChallengeInvalid,

    /// A non-terminal handshake already exists for this peer and direction.
    #[error("Handshake already in progress")]
    HandshakeInProgress,

    /// No session matches the envelope.
    #[error("Session not found")]
    SessionNotFound,

    /// Payload encryption requested before the session is ready.
    #[error("Encryption not ready")]
    EncryptionNotReady,

    /// Event not allowed in the current state.
    #[error("Invalid state: {event} in {state}")]
    InvalidState {
        /// Current state name
        state: String,
        /// Rejected event
        event: String,
    },

    /// Envelope or payload failed to parse.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Fragment rejected by the reassembler.
    #[error("Chunk rejected: {0}")]
    ChunkRejected(String),

    /// Extension type used without negotiating its capability.
    #[error("Capability not negotiated: {0}")]
    CapabilityNotNegotiated(String),
}

impl From<CryptoError> for ProtocolError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed => ProtocolError::DecryptionFailed,
            CryptoError::ExpiredKey { .. } => ProtocolError::SessionExpired,
            CryptoError::WeakSharedSecret | CryptoError::InvalidPublicKey => {
                ProtocolError::ChallengeInvalid
            }
            other => ProtocolError::MalformedMessage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::MalformedMessage(err.to_string())
    }
}

/// Classified transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No answer within the per-call deadline.
    #[error("Transport timeout after {0:?}")]
    Timeout(Duration),

    /// Peer could not be resolved or reached.
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
}

/// Admission control refusals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Bucket for this class is empty.
    #[error("Rate limited ({class})")]
    RateLimited {
        /// Class whose bucket ran dry
        class: crate::MessageClass,
    },

    /// Peer is temporarily blocked for repeated bursting.
    #[error("Blocked until {}", .until.as_millis())]
    Blocked {
        /// End of the block
        until: Timestamp,
    },
}

/// Discovery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhtError {
    /// No seed answered.
    #[error("Bootstrap failed: no seed responded")]
    BootstrapFailed,

    /// Iterative lookup ran out of candidates.
    #[error("Lookup exhausted")]
    LookupExhausted,

    /// No remote replica accepted the write.
    #[error("Store failed: no remote node accepted the value")]
    StoreFailed,

    /// Remote peer refused the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Transport failure on a single RPC.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of an outbound `send`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Protocol-level failure, including a failed handshake.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Dial or delivery failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Our own limiter refused the outbound message.
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The session did not reach READY in time.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

/// Failure of an inbound `receive`. The message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// Validation failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Admission refused.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}
