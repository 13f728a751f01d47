//! Initiator side: sends 1, 3, 5; handles 2, 4, 6.

use std::sync::Arc;

use shared_crypto::{key_confirmation, verify_key_confirmation, EphemeralKeyPair, IdentityKeyPair};
use shared_types::{canonical_bytes, MessageType, PeerId, ProtocolError, Timestamp};
use tracing::debug;
use uuid::Uuid;

use super::core::{HandshakeStep, Session};
use crate::domain::handshake::{
    challenge_binding, session_binding, sign_capabilities, HandshakeAck, HandshakeChallengeResponse,
    HandshakeConfirm, HandshakeFrame, HandshakeInit, HandshakeReady, HandshakeSession,
    SessionParams, INITIATOR_CONFIRM_LABEL, RESPONDER_CONFIRM_LABEL,
};
use crate::domain::{Role, SessionConfig, SessionEvent};

impl Session {
    /// Start a handshake with `peer_id`. Returns the session in
    /// `HandshakeInitSent` and message 1.
    pub fn initiate(
        peer_id: PeerId,
        identity: &IdentityKeyPair,
        config: Arc<SessionConfig>,
        now: Timestamp,
    ) -> Result<(Self, HandshakeFrame), ProtocolError> {
        let mut session = Self::blank(Uuid::new_v4(), Role::Initiator, peer_id, config, now);

        let ephemeral = EphemeralKeyPair::generate();
        let init = HandshakeInit {
            identity_key: identity.public_key(),
            ephemeral_key: ephemeral.public_key(),
            supported_versions: session.config.supported_versions.clone(),
        };
        session.ephemeral = Some(ephemeral);

        let init_bytes = canonical_bytes(&init)?;
        session.transcript.update_framed(&init_bytes);
        session.init_bytes = Some(init_bytes);

        let frame = HandshakeFrame::encode(MessageType::HandshakeInit, &init)?;
        session.apply(SessionEvent::SendInit)?;
        session.record_sent(&frame, now);
        debug!(session = %session.session_id, peer = ?peer_id, "handshake initiated");
        Ok((session, frame))
    }

    /// Message 2 in, message 3 out.
    pub(crate) fn on_ack(
        &mut self,
        identity: &IdentityKeyPair,
        ack: HandshakeAck,
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        self.expect(SessionEvent::RecvAck)?;

        if !self.peer_id.matches(&ack.identity_key) {
            return Err(self.fail(ProtocolError::InvalidSignature));
        }
        if !self.config.supported_versions.contains(&ack.version) {
            let supported = self.config.supported_versions.iter().copied().max().unwrap_or(0);
            return Err(self.fail(ProtocolError::InvalidVersion {
                received: ack.version,
                supported,
            }));
        }

        self.peer_identity = Some(ack.identity_key);
        self.peer_ephemeral = Some(ack.ephemeral_key);
        self.version = ack.version;
        self.transcript.update_framed(&canonical_bytes(&ack)?);
        self.apply(SessionEvent::RecvAck)?;

        let Some(initiator_ephemeral) = self.ephemeral.as_ref().map(EphemeralKeyPair::public_key)
        else {
            return Err(self.fail(ProtocolError::EncryptionNotReady));
        };
        let params = SessionParams {
            session_id: self.session_id,
            version: ack.version,
            initiator_ephemeral,
            responder_ephemeral: ack.ephemeral_key,
        };
        let challenge_signature = identity.sign(&challenge_binding(&ack.challenge, &params)?);
        let capabilities = self.offered_capabilities.clone();
        let capabilities_signature = sign_capabilities(identity, &capabilities)?;
        let response = HandshakeChallengeResponse {
            params,
            challenge_signature,
            capabilities,
            capabilities_signature,
        };

        self.transcript.update_framed(&canonical_bytes(&response)?);
        if let Err(e) = self.derive_keys(&ack.ephemeral_key) {
            return Err(self.fail(e));
        }

        let frame = HandshakeFrame::encode(MessageType::HandshakeChallengeResponse, &response)?;
        self.apply(SessionEvent::SendChallengeResponse)?;
        self.record_sent(&frame, now);
        Ok(HandshakeStep::Reply(frame))
    }

    /// Message 4 in, message 5 out.
    pub(crate) fn on_session(
        &mut self,
        msg: HandshakeSession,
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        self.expect(SessionEvent::RecvSession)?;

        if msg.session_id != self.session_id {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        }
        let (Some(keys), Some(transcript), Some(peer)) =
            (&self.keys, self.transcript_hash, self.peer_identity)
        else {
            return Err(self.fail(ProtocolError::EncryptionNotReady));
        };

        let confirmed = verify_key_confirmation(
            keys.authentication_key(),
            RESPONDER_CONFIRM_LABEL,
            &transcript,
            &msg.confirmation,
        );
        if !confirmed {
            return Err(self.fail(ProtocolError::ChallengeInvalid));
        }

        let binding = session_binding(&msg.session_id, &msg.capabilities, &msg.confirmation, &transcript)?;
        if !peer.verify(&binding, &msg.signature) {
            return Err(self.fail(ProtocolError::InvalidSignature));
        }
        if msg
            .capabilities
            .iter()
            .any(|c| !self.offered_capabilities.contains(c))
        {
            return Err(self.fail(ProtocolError::CapabilityNotNegotiated(msg.capabilities.join(","))));
        }

        let confirmation = key_confirmation(keys.authentication_key(), INITIATOR_CONFIRM_LABEL, &transcript)?;
        self.capabilities = msg.capabilities.into_iter().collect();
        self.apply(SessionEvent::RecvSession)?;

        let frame = HandshakeFrame::encode(
            MessageType::HandshakeConfirm,
            &HandshakeConfirm {
                session_id: self.session_id,
                confirmation,
            },
        )?;
        self.apply(SessionEvent::SendConfirm)?;
        self.record_sent(&frame, now);
        Ok(HandshakeStep::Reply(frame))
    }

    /// Message 6 in: READY.
    pub(crate) fn on_ready(
        &mut self,
        msg: HandshakeReady,
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        self.expect(SessionEvent::RecvReady)?;
        if msg.session_id != self.session_id {
            return Err(ProtocolError::MalformedMessage("ready for another session".into()));
        }
        self.become_ready(SessionEvent::RecvReady, now)?;
        self.last_sent = None;
        Ok(HandshakeStep::Complete)
    }
}
