//! The inbound validation pipeline.
//!
//! Every frame passes the same gates in the same order, and the first
//! failure drops it:
//!
//! 1. Envelope parses and carries a supported version
//! 2. Signature verifies against the sender's identity key
//! 3. Timestamp is fresh and the nonce unseen
//! 4. Session exists and the sequence number fits its window
//! 5. The sender's token bucket for the message class has a token
//! 6. Payload decrypts under the session key
//! 7. Chunks are buffered until their payload is whole
//! 8. The message is handed to its handler

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::IdentityPublicKey;
use shared_types::{
    Envelope, MessageType, PeerId, ProtocolError, ReceiveError, Timestamp,
};
use tracing::{debug, info};
use uuid::Uuid;
use wl_02_session::domain::handshake::decode_payload;
use wl_02_session::domain::HandshakeAck;
use wl_02_session::{HandshakeFrame, HandshakeInit, HandshakeStep, Role, Session, SessionState};
use wl_04_chunking::{ChunkFrame, ChunkProgress};

use super::engine::{SessionProtocolEngine, SessionSlot, SlotRef};
use crate::domain::{DecodedMessage, GapFillRequest, Inbound, RateLimitedNotice, TeardownNotice};
use crate::ports::FrameHandler;

impl SessionProtocolEngine {
    /// Validate and process one inbound frame.
    ///
    /// Handshake messages advance their session; application messages are
    /// dispatched to the registered handler before being returned.
    pub async fn receive(&self, raw: &[u8]) -> Result<Inbound, ReceiveError> {
        let result = self.process(raw).await;
        if let Err(err) = &result {
            debug!(error = %err, "inbound message dropped");
        }
        result
    }

    async fn process(&self, raw: &[u8]) -> Result<Inbound, ReceiveError> {
        let now = self.now();
        let envelope = Envelope::from_bytes(raw)?;

        if envelope.version != Envelope::CURRENT_VERSION {
            return Err(ProtocolError::InvalidVersion {
                received: envelope.version,
                supported: Envelope::CURRENT_VERSION,
            }
            .into());
        }
        if envelope.recipient_id != self.local_id {
            return Err(ProtocolError::MalformedMessage("not addressed to this node".into()).into());
        }
        let session_id = envelope
            .session_id
            .ok_or_else(|| ProtocolError::MalformedMessage("missing session id".into()))?;

        let (key, slot) = self.signing_key(&envelope, session_id)?;
        if !envelope.verify_signature(&key) {
            return Err(ProtocolError::InvalidSignature.into());
        }

        self.nonces
            .check_and_insert(envelope.nonce, envelope.timestamp, now)?;

        if self.is_tombstoned(&session_id) {
            return Err(ProtocolError::SessionNotFound.into());
        }
        let class = envelope.msg_type.class();
        if !envelope.msg_type.is_handshake() {
            let slot = slot.as_ref().ok_or(ProtocolError::SessionNotFound)?;
            if let Err(err) = self.check_session(slot, &envelope) {
                // Only a sender within its rate gets a gap-fill request.
                if let ProtocolError::SequenceError { expected, received } = &err {
                    if self.limiter.check(&envelope.sender_id, class).is_ok() {
                        self.spawn_gap_fill_request(
                            envelope.sender_id,
                            slot.clone(),
                            GapFillRequest {
                                from: *expected,
                                to: *received,
                            },
                        );
                    }
                }
                return Err(err.into());
            }
        }

        if let Err(err) = self.limiter.check(&envelope.sender_id, class) {
            self.notify_rate_limited(envelope.sender_id, class, &err);
            return Err(err.into());
        }

        if envelope.msg_type.is_handshake() {
            return self.on_handshake(envelope, session_id, slot, now).await;
        }
        let slot = slot.ok_or(ProtocolError::SessionNotFound)?;

        let plaintext = {
            let aad = envelope.aad()?;
            slot.lock().session.decrypt(&envelope.payload, &aad, now)?
        };

        let sender = envelope.sender_id;
        match envelope.msg_type.clone() {
            MessageType::Chunk => self.on_chunk(&envelope, session_id, &slot, plaintext),
            MessageType::Heartbeat => Ok(Inbound::Control(MessageType::Heartbeat)),
            MessageType::GapFill => {
                let request: GapFillRequest = decode_payload(&plaintext)?;
                self.spawn_gap_fill_answer(sender, slot, request);
                Ok(Inbound::Control(MessageType::GapFill))
            }
            MessageType::RateLimited => {
                let notice: RateLimitedNotice = decode_payload(&plaintext)?;
                let retry_after = std::time::Duration::from_millis(notice.retry_after_ms)
                    .min(self.config.admission.block_duration);
                debug!(peer = ?sender, class = %notice.class, ?retry_after, "peer asked us to back off");
                self.backoff
                    .insert((sender, notice.class), now.saturating_add(retry_after));
                Ok(Inbound::Control(MessageType::RateLimited))
            }
            MessageType::Teardown => {
                let reason = decode_payload::<TeardownNotice>(&plaintext)
                    .map(|notice| notice.reason)
                    .unwrap_or_default();
                slot.lock().session.close();
                self.forget(&sender, &slot);
                self.tombstone(session_id, now);
                info!(peer = ?sender, session = %session_id, %reason, "session torn down by peer");
                Ok(Inbound::Control(MessageType::Teardown))
            }
            msg_type => Ok(Inbound::Message(self.dispatch(DecodedMessage {
                sender,
                msg_type,
                session_id,
                sequence_num: envelope.sequence_num,
                timestamp: envelope.timestamp,
                transfer_id: None,
                data: plaintext,
            }))),
        }
    }

    /// The key the envelope must be signed with, plus the session it
    /// belongs to when one exists.
    ///
    /// Messages 1 and 2 carry the sender's identity key; everything later
    /// is checked against the key learned during the handshake.
    fn signing_key(
        &self,
        envelope: &Envelope,
        session_id: Uuid,
    ) -> Result<(IdentityPublicKey, Option<SlotRef>), ProtocolError> {
        let sender = &envelope.sender_id;
        match envelope.msg_type {
            MessageType::HandshakeInit => {
                let init: HandshakeInit = decode_payload(&envelope.payload.data)?;
                Ok((init.identity_key, self.slot(sender, Role::Responder)))
            }
            MessageType::HandshakeAck => {
                let ack: HandshakeAck = decode_payload(&envelope.payload.data)?;
                let slot = self
                    .slot_for_session(sender, session_id, Some(Role::Initiator))
                    .ok_or(ProtocolError::SessionNotFound)?;
                Ok((ack.identity_key, Some(slot)))
            }
            ref msg_type => {
                // Even steps travel responder to initiator.
                let role = msg_type.handshake_step().map(|step| {
                    if step % 2 == 0 {
                        Role::Initiator
                    } else {
                        Role::Responder
                    }
                });
                let slot = self
                    .slot_for_session(sender, session_id, role)
                    .ok_or(ProtocolError::SessionNotFound)?;
                let key = slot
                    .lock()
                    .session
                    .peer_identity()
                    .cloned()
                    .ok_or(ProtocolError::SessionNotFound)?;
                Ok((key, Some(slot)))
            }
        }
    }

    /// State, capability and sequence checks for a non-handshake message.
    fn check_session(&self, slot: &SlotRef, envelope: &Envelope) -> Result<(), ProtocolError> {
        let mut guard = slot.lock();
        guard.session.check_expiry(self.now());
        match guard.session.state() {
            SessionState::Ready => {}
            SessionState::Expired => return Err(ProtocolError::SessionExpired),
            _ => return Err(ProtocolError::EncryptionNotReady),
        }
        guard.session.check_capability(&envelope.msg_type)?;

        guard.session.check_sequence(envelope.sequence_num).map(|_| ())
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    async fn on_handshake(
        &self,
        envelope: Envelope,
        session_id: Uuid,
        slot: Option<SlotRef>,
        now: Timestamp,
    ) -> Result<Inbound, ReceiveError> {
        if envelope.payload.encrypted {
            return Err(ProtocolError::MalformedMessage("handshake payload must be plain".into()).into());
        }
        let sender = envelope.sender_id;

        let (slot, reply) = if envelope.msg_type == MessageType::HandshakeInit {
            self.on_init(sender, session_id, &envelope.payload.data, slot, now)?
        } else {
            let slot = slot.ok_or(ProtocolError::SessionNotFound)?;
            let reply = self.advance(&slot, &envelope, now)?;
            (slot, reply)
        };

        if let Some(frame) = reply {
            // A lost reply is recovered by the initiator's retransmission.
            if let Err(err) = self.send_handshake(sender, session_id, frame).await {
                debug!(peer = ?sender, session = %session_id, error = %err, "handshake reply not delivered");
            }
        }

        let state = slot.lock().session.state();
        Ok(Inbound::Handshake { session_id, state })
    }

    /// Message 1: answer a duplicate, refuse a competing handshake, or
    /// open a responder session.
    fn on_init(
        &self,
        sender: PeerId,
        session_id: Uuid,
        data: &[u8],
        existing: Option<SlotRef>,
        now: Timestamp,
    ) -> Result<(SlotRef, Option<HandshakeFrame>), ProtocolError> {
        let existing = match existing {
            Some(slot) if self.expire_if_due(&sender, &slot, now) => {
                if slot.lock().session.session_id() == session_id {
                    return Err(ProtocolError::SessionExpired);
                }
                None
            }
            other => other,
        };
        if let Some(slot) = existing {
            let mut guard = slot.lock();
            if guard.session.session_id() == session_id {
                let resend = match guard.session.handle_handshake(
                    &self.identity,
                    &MessageType::HandshakeInit,
                    data,
                    now,
                )? {
                    HandshakeStep::Duplicate(frame) => frame,
                    _ => None,
                };
                drop(guard);
                return Ok((slot, resend));
            }

            let state = guard.session.state();
            if state.is_handshaking() {
                return Err(ProtocolError::HandshakeInProgress);
            }
            // The peer restarted: the old session gives way.
            let old = guard.session.session_id();
            guard.session.close();
            drop(guard);
            self.forget(&sender, &slot);
            self.tombstone(old, now);
            debug!(peer = ?sender, old = %old, new = %session_id, "replacing responder session");
        }

        let init: HandshakeInit = decode_payload(data)?;
        match Session::accept(
            session_id,
            sender,
            &self.identity,
            &init,
            self.session_config.clone(),
            now,
        ) {
            Ok((session, reply)) => {
                let slot: SlotRef =
                    Arc::new(Mutex::new(SessionSlot::new(session, self.config.retransmit_ring)));
                self.sessions.insert((sender, Role::Responder), slot.clone());
                Ok((slot, Some(reply)))
            }
            Err(err) => {
                self.tombstone(session_id, now);
                Err(err)
            }
        }
    }

    /// Messages 2 to 6 on an existing session.
    fn advance(
        &self,
        slot: &SlotRef,
        envelope: &Envelope,
        now: Timestamp,
    ) -> Result<Option<HandshakeFrame>, ProtocolError> {
        let mut guard = slot.lock();
        match guard
            .session
            .handle_handshake(&self.identity, &envelope.msg_type, &envelope.payload.data, now)
        {
            Ok(HandshakeStep::Reply(frame)) => Ok(Some(frame)),
            Ok(HandshakeStep::Complete) => Ok(None),
            Ok(HandshakeStep::Duplicate(resend)) => {
                debug!(msg_type = %envelope.msg_type, "duplicate handshake message");
                Ok(resend)
            }
            Err(err) => {
                if guard.session.state() == SessionState::Error {
                    guard.failure = Some(err.clone());
                    let session_id = guard.session.session_id();
                    drop(guard);
                    self.tombstone(session_id, now);
                }
                Err(err)
            }
        }
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    fn on_chunk(
        &self,
        envelope: &Envelope,
        session_id: Uuid,
        slot: &SlotRef,
        plaintext: Vec<u8>,
    ) -> Result<Inbound, ReceiveError> {
        let frame = ChunkFrame::from_bytes(&plaintext).map_err(ProtocolError::from)?;
        let transfer_id = frame.transfer_id;
        let sender = envelope.sender_id;

        match self.chunks.accept(sender, frame).map_err(ProtocolError::from)? {
            ChunkProgress::Pending { received, total } => Ok(Inbound::ChunkPending {
                transfer_id,
                received,
                total,
            }),
            ChunkProgress::Discarded => Ok(Inbound::ChunkDiscarded),
            ChunkProgress::Complete(payload) => {
                if !payload.msg_type.is_application() {
                    return Err(ProtocolError::MalformedMessage(format!(
                        "{} cannot be chunked",
                        payload.msg_type
                    ))
                    .into());
                }
                slot.lock().session.check_capability(&payload.msg_type)?;
                Ok(Inbound::Message(self.dispatch(DecodedMessage {
                    sender,
                    msg_type: payload.msg_type,
                    session_id,
                    sequence_num: envelope.sequence_num,
                    timestamp: envelope.timestamp,
                    transfer_id: Some(payload.transfer_id),
                    data: payload.data,
                })))
            }
        }
    }
}

#[async_trait]
impl FrameHandler for SessionProtocolEngine {
    async fn handle_frame(&self, frame: Vec<u8>) {
        // Failures are logged by `receive`; nothing goes back to the sender.
        let _ = self.receive(&frame).await;
    }
}
