//! Responder side: handles 1, 3, 5; sends 2, 4, 6.

use std::sync::Arc;

use shared_crypto::{key_confirmation, verify_key_confirmation, EphemeralKeyPair, IdentityKeyPair};
use shared_types::{canonical_bytes, MessageType, PeerId, ProtocolError, Timestamp};
use tracing::debug;
use uuid::Uuid;

use super::core::{HandshakeStep, IssuedChallenge, Session};
use crate::domain::handshake::{
    capabilities_binding, challenge_binding, decode_payload, generate_challenge,
    negotiate_capabilities, session_binding, HandshakeAck, HandshakeChallengeResponse,
    HandshakeConfirm, HandshakeFrame, HandshakeInit, HandshakeReady, HandshakeSession,
    INITIATOR_CONFIRM_LABEL, RESPONDER_CONFIRM_LABEL,
};
use crate::domain::{Role, SessionConfig, SessionEvent};

impl Session {
    /// Answer message 1 from `peer_id` proposing `session_id`. Returns the
    /// session in `ChallengeSent` and message 2.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the identity key does not own `peer_id`
    /// - `InvalidVersion` if no version is shared
    pub fn accept(
        session_id: Uuid,
        peer_id: PeerId,
        identity: &IdentityKeyPair,
        init: &HandshakeInit,
        config: Arc<SessionConfig>,
        now: Timestamp,
    ) -> Result<(Self, HandshakeFrame), ProtocolError> {
        if !peer_id.matches(&init.identity_key) {
            return Err(ProtocolError::InvalidSignature);
        }
        let version = config
            .choose_version(&init.supported_versions)
            .ok_or_else(|| ProtocolError::InvalidVersion {
                received: init.supported_versions.iter().copied().max().unwrap_or(0),
                supported: config.supported_versions.iter().copied().max().unwrap_or(0),
            })?;

        let mut session = Self::blank(session_id, Role::Responder, peer_id, config, now);
        session.peer_identity = Some(init.identity_key);
        session.peer_ephemeral = Some(init.ephemeral_key);
        session.version = version;

        let init_bytes = canonical_bytes(init)?;
        session.transcript.update_framed(&init_bytes);
        session.init_bytes = Some(init_bytes);

        let ephemeral = EphemeralKeyPair::generate();
        let challenge = generate_challenge();
        let ack = HandshakeAck {
            identity_key: identity.public_key(),
            ephemeral_key: ephemeral.public_key(),
            challenge,
            version,
        };
        session.ephemeral = Some(ephemeral);
        session.challenge = Some(IssuedChallenge {
            value: challenge,
            issued_at: now,
        });
        session.transcript.update_framed(&canonical_bytes(&ack)?);

        let frame = HandshakeFrame::encode(MessageType::HandshakeAck, &ack)?;
        session.apply(SessionEvent::RecvInit)?;
        session.last_received_step = 1;
        session.record_sent(&frame, now);
        debug!(session = %session_id, peer = ?peer_id, version, "handshake accepted");
        Ok((session, frame))
    }

    /// `true` if `data` is the same message 1 this session was created from.
    pub fn is_same_init(&self, data: &[u8]) -> bool {
        let Ok(init) = decode_payload::<HandshakeInit>(data) else {
            return false;
        };
        match (canonical_bytes(&init), &self.init_bytes) {
            (Ok(bytes), Some(ours)) => bytes == *ours,
            _ => false,
        }
    }

    /// Message 3 in, message 4 out.
    pub(crate) fn on_challenge_response(
        &mut self,
        identity: &IdentityKeyPair,
        msg: HandshakeChallengeResponse,
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        self.expect(SessionEvent::RecvChallengeResponse)?;

        let (Some(issued), Some(peer), Some(peer_ephemeral)) =
            (self.challenge, self.peer_identity, self.peer_ephemeral)
        else {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        };
        if now.since(issued.issued_at) > self.config.challenge_ttl {
            return Err(self.fail(ProtocolError::ChallengeExpired));
        }

        let own_ephemeral = self.ephemeral.as_ref().map(EphemeralKeyPair::public_key);
        let params = &msg.params;
        let params_match = params.session_id == self.session_id
            && params.version == self.version
            && params.initiator_ephemeral == peer_ephemeral
            && Some(params.responder_ephemeral) == own_ephemeral;
        if !params_match {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        }

        let challenge_ok = challenge_binding(&issued.value, params)
            .map(|bytes| peer.verify(&bytes, &msg.challenge_signature))
            .unwrap_or(false);
        if !challenge_ok {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        }
        let capabilities_ok = capabilities_binding(&msg.capabilities)
            .map(|bytes| peer.verify(&bytes, &msg.capabilities_signature))
            .unwrap_or(false);
        if !capabilities_ok {
            return Err(self.fail(ProtocolError::InvalidSignature));
        }

        self.transcript.update_framed(&canonical_bytes(&msg)?);
        if let Err(e) = self.derive_keys(&peer_ephemeral) {
            return Err(self.fail(e));
        }
        let (Some(keys), Some(transcript)) = (&self.keys, self.transcript_hash) else {
            return Err(self.fail(ProtocolError::EncryptionNotReady));
        };

        let agreed = negotiate_capabilities(&msg.capabilities, &self.offered_capabilities);
        let confirmation = key_confirmation(keys.authentication_key(), RESPONDER_CONFIRM_LABEL, &transcript)?;
        let signature = identity.sign(&session_binding(&self.session_id, &agreed, &confirmation, &transcript)?);
        let reply = HandshakeSession {
            session_id: self.session_id,
            capabilities: agreed.clone(),
            confirmation,
            signature,
        };

        let frame = HandshakeFrame::encode(MessageType::HandshakeSession, &reply)?;
        self.capabilities = agreed.into_iter().collect();
        self.challenge = None;
        self.apply(SessionEvent::RecvChallengeResponse)?;
        self.record_sent(&frame, now);
        Ok(HandshakeStep::Reply(frame))
    }

    /// Message 5 in, message 6 out: READY.
    pub(crate) fn on_confirm(
        &mut self,
        msg: HandshakeConfirm,
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        self.expect(SessionEvent::RecvConfirm)?;

        let (Some(keys), Some(transcript)) = (&self.keys, self.transcript_hash) else {
            return Err(self.fail(ProtocolError::EncryptionNotReady));
        };
        let confirmed = msg.session_id == self.session_id
            && verify_key_confirmation(
                keys.authentication_key(),
                INITIATOR_CONFIRM_LABEL,
                &transcript,
                &msg.confirmation,
            );
        if !confirmed {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        }

        self.apply(SessionEvent::RecvConfirm)?;
        let frame = HandshakeFrame::encode(
            MessageType::HandshakeReady,
            &HandshakeReady {
                session_id: self.session_id,
            },
        )?;
        self.become_ready(SessionEvent::SendReady, now)?;
        self.record_sent(&frame, now);
        Ok(HandshakeStep::Reply(frame))
    }
}
