//! # Message Envelope
//!
//! The single wire format between peers: JSON with a header, a replay
//! nonce, an optionally encrypted payload and an Ed25519 signature.
//!
//! ## Security Properties
//!
//! - **Versioning**: `version` is checked before anything else.
//! - **Signature**: covers the canonical form of every other field.
//! - **Time-Bounded Replay Prevention**: nonces are only valid within the
//!   timestamp window, `now - 60s <= timestamp <= now + 10s`.
//! - **Header binding**: AEAD associated data is the canonical header, so a
//!   ciphertext cannot be replayed under another sequence number or session.

use crate::canonical::{canonical_bytes, canonical_bytes_without};
use crate::errors::ProtocolError;
use crate::ids::PeerId;
use crate::message_type::MessageType;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use shared_crypto::{IdentityKeyPair, IdentityPublicKey, IdentitySignature, Nonce};
use std::time::Duration;
use uuid::Uuid;

/// Envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// `true` when `data` is AEAD ciphertext.
    pub encrypted: bool,
    /// Plaintext or ciphertext bytes, hex on the wire.
    #[serde(with = "shared_crypto::encoding::hex_bytes")]
    pub data: Vec<u8>,
    /// XChaCha20 nonce, present iff `encrypted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aead_nonce: Option<Nonce>,
}

impl Payload {
    /// Unencrypted payload.
    pub fn plain(data: Vec<u8>) -> Self {
        Self {
            encrypted: false,
            data,
            aead_nonce: None,
        }
    }

    /// Encrypted payload.
    pub fn sealed(ciphertext: Vec<u8>, nonce: Nonce) -> Self {
        Self {
            encrypted: true,
            data: ciphertext,
            aead_nonce: Some(nonce),
        }
    }
}

/// Signed peer-to-peer envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    // =========================================================================
    // HEADER SECTION
    // =========================================================================
    /// Protocol version.
    pub version: u16,

    /// Message kind.
    pub msg_type: MessageType,

    /// Sender identity. Must hash-match the key that verifies `signature`.
    pub sender_id: PeerId,

    /// Intended recipient.
    pub recipient_id: PeerId,

    /// Set on every session message, handshake included. Receivers drop
    /// envelopes without one.
    pub session_id: Option<Uuid>,

    /// Per-session, per-direction counter. Zero on handshake messages.
    pub sequence_num: u64,

    /// Creation time in Unix milliseconds.
    pub timestamp: Timestamp,

    // =========================================================================
    // SECURITY SECTION
    // =========================================================================
    /// Unique nonce for replay prevention within the timestamp window.
    pub nonce: Uuid,

    // =========================================================================
    // PAYLOAD SECTION
    // =========================================================================
    /// Body.
    pub payload: Payload,

    /// Signature over [`Envelope::signing_bytes`].
    pub signature: Option<IdentitySignature>,
}

/// The subset of header fields bound into the AEAD tag.
#[derive(Serialize)]
struct AadHeader<'a> {
    version: u16,
    msg_type: &'a MessageType,
    sender_id: &'a PeerId,
    recipient_id: &'a PeerId,
    session_id: &'a Option<Uuid>,
    sequence_num: u64,
}

impl Envelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Maximum allowed clock skew for future timestamps.
    pub const MAX_FUTURE_SKEW: Duration = Duration::from_secs(10);

    /// Maximum age for valid timestamps.
    pub const MAX_AGE: Duration = Duration::from_secs(60);

    /// Duration to retain nonces in cache (2x the validity window).
    pub const NONCE_CACHE_TTL: Duration = Duration::from_secs(120);

    /// New unsigned envelope with a fresh nonce.
    pub fn new(
        msg_type: MessageType,
        sender_id: PeerId,
        recipient_id: PeerId,
        session_id: Option<Uuid>,
        sequence_num: u64,
        timestamp: Timestamp,
        payload: Payload,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            msg_type,
            sender_id,
            recipient_id,
            session_id,
            sequence_num,
            timestamp,
            nonce: Uuid::new_v4(),
            payload,
            signature: None,
        }
    }

    /// Canonical form of everything except `signature`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        canonical_bytes_without(self, &["signature"])
    }

    /// Associated data for payload encryption.
    pub fn aad(&self) -> Result<Vec<u8>, ProtocolError> {
        canonical_bytes(&AadHeader {
            version: self.version,
            msg_type: &self.msg_type,
            sender_id: &self.sender_id,
            recipient_id: &self.recipient_id,
            session_id: &self.session_id,
            sequence_num: self.sequence_num,
        })
    }

    /// Sign in place.
    pub fn sign(&mut self, keypair: &IdentityKeyPair) -> Result<(), ProtocolError> {
        let bytes = self.signing_bytes()?;
        self.signature = Some(keypair.sign(&bytes));
        Ok(())
    }

    /// Builder form of [`Envelope::sign`].
    pub fn signed(mut self, keypair: &IdentityKeyPair) -> Result<Self, ProtocolError> {
        self.sign(keypair)?;
        Ok(self)
    }

    /// `true` iff the signature verifies under `key` and `key` owns `sender_id`.
    pub fn verify_signature(&self, key: &IdentityPublicKey) -> bool {
        let Some(sig) = &self.signature else {
            return false;
        };
        if !self.sender_id.matches(key) {
            return false;
        }
        match self.signing_bytes() {
            Ok(bytes) => key.verify(&bytes, sig),
            Err(_) => false,
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(raw).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}
