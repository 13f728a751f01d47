//! Outbound operations: send, heartbeat, teardown and the background
//! tasks that retransmit handshakes and answer gap-fill requests.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use shared_types::{
    AdmissionError, MessageClass, MessageType, PeerId, ProtocolError, SendError,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wl_02_session::{Role, Session, SessionState};

use super::engine::{SessionProtocolEngine, SessionSlot, SlotRef};
use crate::domain::{DeliveryReceipt, GapFillRequest, RateLimitedNotice, TeardownNotice};

impl SessionProtocolEngine {
    // =========================================================================
    // Public operations
    // =========================================================================

    /// Send an application message to `peer`.
    ///
    /// Establishes a session first if none is READY, waiting at most
    /// `send_timeout`. Payloads above the chunking threshold go out as
    /// `CHUNK` messages, one sequence number each.
    ///
    /// # Errors
    ///
    /// - `Protocol` for a failed handshake, a non-application type or an
    ///   extension the session did not negotiate
    /// - `Transport` when the peer cannot be resolved or reached
    /// - `Admission` while the peer asked us to back off this class
    /// - `HandshakeTimeout` when READY was not reached in time
    pub async fn send(
        &self,
        peer: PeerId,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<DeliveryReceipt, SendError> {
        if !msg_type.is_application() {
            return Err(ProtocolError::MalformedMessage(format!(
                "{msg_type} is not an application message type"
            ))
            .into());
        }
        self.check_backoff(&peer, msg_type.class())?;

        let slot = self.ready_session(peer).await?;
        let session_id = {
            let slot = slot.lock();
            slot.session.check_capability(&msg_type)?;
            slot.session.session_id()
        };

        if !self.chunks.needs_split(payload.len()) {
            let seq = self.send_sealed(&slot, peer, msg_type, payload).await?;
            return Ok(DeliveryReceipt {
                session_id,
                first_seq: seq,
                last_seq: seq,
                chunks: 0,
            });
        }

        let frames = self.chunks.split(&msg_type, &payload).map_err(ProtocolError::from)?;
        let count = frames.len() as u32;
        let mut first_seq = None;
        let mut last_seq = 0;
        for frame in frames {
            let body = frame.to_bytes().map_err(ProtocolError::from)?;
            let seq = self.send_sealed(&slot, peer, MessageType::Chunk, body).await?;
            first_seq.get_or_insert(seq);
            last_seq = seq;
        }
        debug!(peer = ?peer, %msg_type, bytes = payload.len(), chunks = count, "sent chunked payload");

        Ok(DeliveryReceipt {
            session_id,
            first_seq: first_seq.unwrap_or(last_seq),
            last_seq,
            chunks: count,
        })
    }

    /// Send a `HEARTBEAT` on the READY session with `peer`.
    pub async fn heartbeat(&self, peer: PeerId) -> Result<u64, SendError> {
        let slot = self.ready_slot(&peer).ok_or(ProtocolError::SessionNotFound)?;
        self.send_sealed(&slot, peer, MessageType::Heartbeat, Vec::new()).await
    }

    /// Close every session with `peer`, telling it first when a session
    /// is READY. Returns how many sessions were closed.
    pub async fn teardown(&self, peer: PeerId) -> Result<usize, SendError> {
        let mut closed = 0;
        for role in [Role::Initiator, Role::Responder] {
            let Some((_, slot)) = self.sessions.remove(&(peer, role)) else {
                continue;
            };
            let ready = slot.lock().session.is_ready();
            if ready {
                let body = serde_json::to_vec(&TeardownNotice {
                    reason: "closed by peer".into(),
                })
                .map_err(ProtocolError::from)?;
                if let Err(err) = self.send_sealed(&slot, peer, MessageType::Teardown, body).await {
                    debug!(peer = ?peer, error = %err, "teardown notice not delivered");
                }
            }
            let session_id = {
                let mut slot = slot.lock();
                slot.session.close();
                slot.session.session_id()
            };
            self.tombstone(session_id, self.now());
            closed += 1;
        }

        if closed == 0 {
            return Err(ProtocolError::SessionNotFound.into());
        }
        info!(peer = ?peer, sessions = closed, "sessions torn down");
        Ok(closed)
    }

    // =========================================================================
    // Session establishment
    // =========================================================================

    fn check_backoff(&self, peer: &PeerId, class: MessageClass) -> Result<(), SendError> {
        let until = self.backoff.get(&(*peer, class)).map(|e| *e.value());
        match until {
            Some(until) if self.now() < until => {
                Err(AdmissionError::RateLimited { class }.into())
            }
            _ => Ok(()),
        }
    }

    /// A READY session with `peer`, handshaking first if needed.
    pub(crate) async fn ready_session(&self, peer: PeerId) -> Result<SlotRef, SendError> {
        let now = self.now();
        for role in [Role::Initiator, Role::Responder] {
            if let Some(slot) = self.slot(&peer, role) {
                self.expire_if_due(&peer, &slot, now);
            }
        }
        if let Some(slot) = self.ready_slot(&peer) {
            return Ok(slot);
        }

        let (slot, states) = self.start_handshake(peer).await?;
        let deadline = self.config.send_timeout;
        match tokio::time::timeout(deadline, self.await_ready(&slot, states)).await {
            Ok(Ok(())) => Ok(slot),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(peer = ?peer, timeout = ?deadline, "handshake did not complete in time");
                Err(SendError::HandshakeTimeout(deadline))
            }
        }
    }

    async fn await_ready(
        &self,
        slot: &SlotRef,
        mut states: watch::Receiver<SessionState>,
    ) -> Result<(), SendError> {
        loop {
            let state = *states.borrow_and_update();
            match state {
                SessionState::Ready => return Ok(()),
                SessionState::Error => {
                    let failure = slot.lock().failure.clone();
                    return Err(failure.unwrap_or(ProtocolError::ChallengeInvalid).into());
                }
                SessionState::Expired => {
                    return Err(SendError::HandshakeTimeout(self.session_config.handshake_timeout))
                }
                _ => {}
            }
            if states.changed().await.is_err() {
                return Err(ProtocolError::SessionNotFound.into());
            }
        }
    }

    /// Join the handshake already running with `peer` or start one.
    async fn start_handshake(
        &self,
        peer: PeerId,
    ) -> Result<(SlotRef, watch::Receiver<SessionState>), SendError> {
        let (slot, first) = match self.sessions.entry((peer, Role::Initiator)) {
            Entry::Occupied(entry) if !entry.get().lock().session.state().is_terminal() => {
                let slot = entry.get().clone();
                drop(entry);
                let states = slot.lock().session.subscribe();
                return Ok((slot, states));
            }
            entry => {
                let (session, first) =
                    Session::initiate(peer, &self.identity, self.session_config.clone(), self.now())?;
                let slot: SlotRef =
                    Arc::new(Mutex::new(SessionSlot::new(session, self.config.retransmit_ring)));
                entry.insert(slot.clone());
                (slot, first)
            }
        };

        let (session_id, states) = {
            let slot = slot.lock();
            (slot.session.session_id(), slot.session.subscribe())
        };
        info!(peer = ?peer, session = %session_id, "starting handshake");

        if let Err(err) = self.send_handshake(peer, session_id, first).await {
            warn!(peer = ?peer, session = %session_id, error = %err, "handshake could not be sent");
            slot.lock().session.close();
            self.forget(&peer, &slot);
            self.tombstone(session_id, self.now());
            return Err(err);
        }
        self.spawn_retransmit(peer, slot.clone());
        Ok((slot, states))
    }

    /// Resend the initiator's last handshake message until the session
    /// leaves the handshake.
    fn spawn_retransmit(&self, peer: PeerId, slot: SlotRef) {
        let engine = self.this.clone();
        let interval = self.session_config.retransmit_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if engine.expire_if_due(&peer, &slot, engine.now()) {
                    break;
                }
                let due = {
                    let mut slot = slot.lock();
                    if !slot.session.state().is_handshaking() {
                        break;
                    }
                    let session_id = slot.session.session_id();
                    slot.session
                        .due_retransmit(engine.now())
                        .map(|frame| (session_id, frame))
                };
                if let Some((session_id, frame)) = due {
                    if let Err(err) = engine.send_handshake(peer, session_id, frame).await {
                        debug!(peer = ?peer, error = %err, "handshake retransmit failed");
                    }
                }
            }
        });
    }

    // =========================================================================
    // Control messages
    // =========================================================================

    /// Ask `peer` to resend `request.from..=request.to`.
    pub(crate) fn spawn_gap_fill_request(&self, peer: PeerId, slot: SlotRef, request: GapFillRequest) {
        let engine = self.this.clone();
        tokio::spawn(async move {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let body = match serde_json::to_vec(&request) {
                Ok(body) => body,
                Err(err) => {
                    debug!(error = %err, "gap-fill request not encoded");
                    return;
                }
            };
            debug!(peer = ?peer, from = request.from, to = request.to, "requesting gap fill");
            if let Err(err) = engine.send_sealed(&slot, peer, MessageType::GapFill, body).await {
                debug!(peer = ?peer, error = %err, "gap-fill request not delivered");
            }
        });
    }

    /// Resend what `peer` asked for from the retransmit ring, each under a
    /// fresh envelope with its original sequence number.
    pub(crate) fn spawn_gap_fill_answer(&self, peer: PeerId, slot: SlotRef, request: GapFillRequest) {
        let engine = self.this.clone();
        tokio::spawn(async move {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let envelopes: Vec<_> = {
                let slot = slot.lock();
                slot.ring
                    .range(request.from, request.to)
                    .into_iter()
                    .filter_map(|sent| {
                        engine
                            .seal(&slot.session, peer, sent.msg_type, sent.seq, &sent.plaintext)
                            .ok()
                    })
                    .collect()
            };
            debug!(peer = ?peer, resent = envelopes.len(), from = request.from, to = request.to, "answering gap fill");
            for envelope in envelopes {
                if let Err(err) = engine.deliver(&peer, &envelope).await {
                    debug!(peer = ?peer, error = %err, "gap-fill resend failed");
                    break;
                }
            }
        });
    }

    /// Tell `peer` it is being rate limited, at most once per notify
    /// interval and only over a READY session.
    pub(crate) fn notify_rate_limited(&self, peer: PeerId, class: MessageClass, error: &AdmissionError) {
        if !self.limiter.should_notify(&peer) {
            return;
        }
        let Some(slot) = self.ready_slot(&peer) else {
            return;
        };
        let retry_after = match error {
            AdmissionError::Blocked { until } => until.since(self.now()),
            AdmissionError::RateLimited { .. } => self.config.rate_limited_backoff,
        };
        let notice = RateLimitedNotice {
            class,
            retry_after_ms: retry_after.as_millis() as u64,
        };

        let engine = self.this.clone();
        tokio::spawn(async move {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let body = match serde_json::to_vec(&notice) {
                Ok(body) => body,
                Err(_) => return,
            };
            if let Err(err) = engine.send_sealed(&slot, peer, MessageType::RateLimited, body).await {
                debug!(peer = ?peer, error = %err, "rate-limit notice not delivered");
            }
        });
    }
}
