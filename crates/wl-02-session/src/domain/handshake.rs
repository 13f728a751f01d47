//! Handshake message payloads.
//!
//! Each struct is the JSON body of one handshake envelope. The envelope
//! carries identity (signature over the whole message); these payloads
//! carry the key exchange, the challenge and the key confirmations.
//!
//! | # | Type | Direction | Contents |
//! |---|------|-----------|----------|
//! | 1 | `HANDSHAKE_INIT` | I → R | identity key, ephemeral key, versions |
//! | 2 | `HANDSHAKE_ACK` | R → I | identity key, ephemeral key, challenge, version |
//! | 3 | `HANDSHAKE_CHALLENGE_RESPONSE` | I → R | signed challenge + params, signed capabilities |
//! | 4 | `HANDSHAKE_SESSION` | R → I | session id, agreed capabilities, confirmation |
//! | 5 | `HANDSHAKE_CONFIRM` | I → R | confirmation |
//! | 6 | `HANDSHAKE_READY` | R → I | ready |

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_crypto::encoding::hex_array;
use shared_crypto::{ExchangePublicKey, Hash, IdentityKeyPair, IdentityPublicKey, IdentitySignature};
use shared_types::{canonical_bytes, MessageType, ProtocolError};
use uuid::Uuid;

/// HMAC label for the responder's confirmation in message 4.
pub const RESPONDER_CONFIRM_LABEL: &[u8] = b"wavelink/v1/confirm/responder";

/// HMAC label for the initiator's confirmation in message 5.
pub const INITIATOR_CONFIRM_LABEL: &[u8] = b"wavelink/v1/confirm/initiator";

/// Random challenge issued in message 2.
pub type Challenge = [u8; 32];

/// Fresh random challenge.
pub fn generate_challenge() -> Challenge {
    let mut challenge = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    challenge
}

/// Message 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeInit {
    pub identity_key: IdentityPublicKey,
    pub ephemeral_key: ExchangePublicKey,
    pub supported_versions: Vec<u16>,
}

/// Message 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub identity_key: IdentityPublicKey,
    pub ephemeral_key: ExchangePublicKey,
    #[serde(with = "hex_array")]
    pub challenge: Challenge,
    pub version: u16,
}

/// Parameters the initiator commits to in message 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub session_id: Uuid,
    pub version: u16,
    pub initiator_ephemeral: ExchangePublicKey,
    pub responder_ephemeral: ExchangePublicKey,
}

/// Message 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeChallengeResponse {
    pub params: SessionParams,
    /// Over [`challenge_binding`] of the challenge and `params`.
    pub challenge_signature: IdentitySignature,
    pub capabilities: Vec<String>,
    /// Over the canonical form of `capabilities`.
    pub capabilities_signature: IdentitySignature,
}

/// Message 4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeSession {
    pub session_id: Uuid,
    /// Intersection of both capability sets, sorted.
    pub capabilities: Vec<String>,
    /// HMAC under the authentication key, proving key agreement.
    #[serde(with = "hex_array")]
    pub confirmation: [u8; 32],
    /// Over [`session_binding`].
    pub signature: IdentitySignature,
}

/// Message 5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfirm {
    pub session_id: Uuid,
    #[serde(with = "hex_array")]
    pub confirmation: [u8; 32],
}

/// Message 6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReady {
    pub session_id: Uuid,
}

/// A handshake message ready for an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeFrame {
    pub msg_type: MessageType,
    /// JSON payload.
    pub data: Vec<u8>,
}

impl HandshakeFrame {
    /// Encode `payload` as the body of a `msg_type` message.
    pub fn encode<T: Serialize>(msg_type: MessageType, payload: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type,
            data: serde_json::to_vec(payload)?,
        })
    }

    /// Handshake step (1..=6).
    pub fn step(&self) -> Option<u8> {
        self.msg_type.handshake_step()
    }
}

/// Decode a handshake payload.
pub fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(data).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Bytes signed by `challenge_signature`.
pub fn challenge_binding(challenge: &Challenge, params: &SessionParams) -> Result<Vec<u8>, ProtocolError> {
    #[derive(Serialize)]
    struct Binding<'a> {
        #[serde(with = "hex_array")]
        challenge: Challenge,
        params: &'a SessionParams,
    }
    canonical_bytes(&Binding {
        challenge: *challenge,
        params,
    })
}

/// Bytes signed by `capabilities_signature`.
pub fn capabilities_binding(capabilities: &[String]) -> Result<Vec<u8>, ProtocolError> {
    canonical_bytes(capabilities)
}

/// Bytes signed by message 4's `signature`: ties the session id, agreed
/// capabilities and confirmation to the transcript.
pub fn session_binding(
    session_id: &Uuid,
    capabilities: &[String],
    confirmation: &[u8; 32],
    transcript: &Hash,
) -> Result<Vec<u8>, ProtocolError> {
    #[derive(Serialize)]
    struct Binding<'a> {
        session_id: &'a Uuid,
        capabilities: &'a [String],
        #[serde(with = "hex_array")]
        confirmation: [u8; 32],
        #[serde(with = "hex_array")]
        transcript: Hash,
    }
    canonical_bytes(&Binding {
        session_id,
        capabilities,
        confirmation: *confirmation,
        transcript: *transcript,
    })
}

/// Sign the capability set.
pub fn sign_capabilities(
    identity: &IdentityKeyPair,
    capabilities: &[String],
) -> Result<IdentitySignature, ProtocolError> {
    Ok(identity.sign(&capabilities_binding(capabilities)?))
}

/// Sorted intersection of two capability sets.
pub fn negotiate_capabilities(offered: &[String], local: &[String]) -> Vec<String> {
    let mut agreed: Vec<String> = offered
        .iter()
        .filter(|c| local.contains(c))
        .cloned()
        .collect();
    agreed.sort();
    agreed.dedup();
    agreed
}
