use std::collections::BTreeSet;
use std::sync::Arc;

use shared_crypto::{
    aead_decrypt, aead_encrypt, derive_session_keys, Blake3Hasher, EphemeralKeyPair,
    ExchangePublicKey, Hash, IdentityKeyPair, IdentityPublicKey, Nonce, SessionKeys,
};
use shared_types::{MessageType, Payload, PeerId, ProtocolError, Timestamp};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::handshake::{decode_payload, Challenge, HandshakeFrame};
use crate::domain::{transition, ReplayWindow, Role, SessionConfig, SessionEvent, SessionState, WindowVerdict};

/// What handling an inbound handshake message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Send this next.
    Reply(HandshakeFrame),
    /// Handshake finished on this side; nothing to send.
    Complete,
    /// A message already processed arrived again. The responder re-sends
    /// its stored answer; the initiator ignores it.
    Duplicate(Option<HandshakeFrame>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IssuedChallenge {
    pub(crate) value: Challenge,
    pub(crate) issued_at: Timestamp,
}

/// A session with one peer.
///
/// Exclusively owned by whoever drives the peer relation; shared access
/// goes through a lock around the whole session.
pub struct Session {
    pub(crate) session_id: Uuid,
    pub(crate) role: Role,
    pub(crate) peer_id: PeerId,
    pub(crate) peer_identity: Option<IdentityPublicKey>,
    pub(crate) state: SessionState,
    pub(crate) version: u16,
    pub(crate) config: Arc<SessionConfig>,

    // Key material
    pub(crate) ephemeral: Option<EphemeralKeyPair>,
    pub(crate) peer_ephemeral: Option<ExchangePublicKey>,
    pub(crate) keys: Option<SessionKeys>,
    pub(crate) transcript: Blake3Hasher,
    pub(crate) transcript_hash: Option<Hash>,
    pub(crate) challenge: Option<IssuedChallenge>,

    // Capabilities
    pub(crate) offered_capabilities: Vec<String>,
    pub(crate) capabilities: BTreeSet<String>,

    // Ordering
    pub(crate) send_seq: u64,
    pub(crate) recv_window: ReplayWindow,

    // Handshake progress and retransmission
    pub(crate) last_sent: Option<HandshakeFrame>,
    pub(crate) last_sent_at: Timestamp,
    pub(crate) retransmits: u32,
    /// Highest handshake step received and processed.
    pub(crate) last_received_step: u8,
    /// Canonical message 1, kept to recognise a retransmitted INIT.
    pub(crate) init_bytes: Option<Vec<u8>>,

    pub(crate) created_at: Timestamp,
    pub(crate) expires_at: Timestamp,
    pub(crate) state_tx: watch::Sender<SessionState>,
}

impl Session {
    pub(crate) fn blank(
        session_id: Uuid,
        role: Role,
        peer_id: PeerId,
        config: Arc<SessionConfig>,
        now: Timestamp,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Initial);
        Self {
            session_id,
            role,
            peer_id,
            peer_identity: None,
            state: SessionState::Initial,
            version: 0,
            ephemeral: None,
            peer_ephemeral: None,
            keys: None,
            transcript: Blake3Hasher::new(),
            transcript_hash: None,
            challenge: None,
            offered_capabilities: config.capabilities.clone(),
            capabilities: BTreeSet::new(),
            send_seq: 0,
            recv_window: ReplayWindow::new(config.replay_window, config.forward_window),
            last_sent: None,
            last_sent_at: now,
            retransmits: 0,
            last_received_step: 0,
            init_bytes: None,
            created_at: now,
            expires_at: now.saturating_add(config.handshake_timeout),
            state_tx,
            config,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The peer's identity key, known from message 1 (responder) or 2
    /// (initiator) on.
    pub fn peer_identity(&self) -> Option<&IdentityPublicKey> {
        self.peer_identity.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Negotiated protocol version (0 before message 2).
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Capabilities both sides agreed on.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(String::as_str)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Handshake deadline before READY, end of life after.
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Derived keys, present from message 3 until teardown.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Hash of handshake messages 1 to 3.
    pub fn transcript_hash(&self) -> Option<&Hash> {
        self.transcript_hash.as_ref()
    }

    /// Next sequence number the peer is expected to send.
    pub fn expected_recv_seq(&self) -> u64 {
        self.recv_window.expected()
    }

    /// Follow state changes. The receiver sees the current state at once.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Apply `event` through the transition table.
    pub(crate) fn apply(&mut self, event: SessionEvent) -> Result<(), ProtocolError> {
        let next = transition(self.role, self.state, event)?;
        debug!(
            session = %self.session_id,
            peer = ?self.peer_id,
            from = %self.state,
            to = %next,
            %event,
            "session transition"
        );
        self.state = next;
        self.state_tx.send_replace(next);
        if next.is_terminal() {
            self.wipe();
        }
        Ok(())
    }

    /// Check that `event` is valid now without applying it.
    pub(crate) fn expect(&self, event: SessionEvent) -> Result<(), ProtocolError> {
        transition(self.role, self.state, event).map(|_| ())
    }

    /// Move to `Error` and return `error`.
    pub(crate) fn fail(&mut self, error: ProtocolError) -> ProtocolError {
        warn!(
            session = %self.session_id,
            peer = ?self.peer_id,
            state = %self.state,
            %error,
            "handshake failed"
        );
        let _ = self.apply(SessionEvent::Failure);
        error
    }

    pub(crate) fn record_sent(&mut self, frame: &HandshakeFrame, now: Timestamp) {
        self.last_sent = Some(frame.clone());
        self.last_sent_at = now;
        self.retransmits = 0;
    }

    /// Derive keys from our ephemeral secret, the peer's ephemeral key and
    /// the finished transcript.
    pub(crate) fn derive_keys(
        &mut self,
        peer_ephemeral: &ExchangePublicKey,
    ) -> Result<(), ProtocolError> {
        let ephemeral = self.ephemeral.as_ref().ok_or(ProtocolError::EncryptionNotReady)?;
        let shared = ephemeral.diffie_hellman(peer_ephemeral);
        let transcript = self.transcript.finalize();
        let keys = derive_session_keys(&shared, &transcript)?;
        self.transcript_hash = Some(transcript);
        self.keys = Some(keys);
        Ok(())
    }

    /// Enter READY: start the session lifetime and drop the ephemeral secret.
    pub(crate) fn become_ready(&mut self, event: SessionEvent, now: Timestamp) -> Result<(), ProtocolError> {
        self.apply(event)?;
        self.expires_at = now.saturating_add(self.config.session_lifetime);
        if let Some(keys) = self.keys.take() {
            self.keys = Some(keys.with_expiry(self.expires_at.as_millis()));
        }
        self.ephemeral = None;
        self.last_sent_at = now;
        info!(
            session = %self.session_id,
            peer = ?self.peer_id,
            role = ?self.role,
            capabilities = self.capabilities.len(),
            "session ready"
        );
        Ok(())
    }

    fn wipe(&mut self) {
        // SecretKey and EphemeralKeyPair zeroize on drop.
        self.keys = None;
        self.ephemeral = None;
        self.challenge = None;
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Feed an inbound handshake message (steps 2 to 6) to the session.
    ///
    /// Messages at or below the last processed step are duplicates: the
    /// responder answers with its stored reply, the initiator ignores them.
    /// A message that does not fit the current state is `InvalidState` and
    /// leaves the session untouched.
    pub fn handle_handshake(
        &mut self,
        identity: &IdentityKeyPair,
        msg_type: &MessageType,
        data: &[u8],
        now: Timestamp,
    ) -> Result<HandshakeStep, ProtocolError> {
        let step = msg_type
            .handshake_step()
            .ok_or_else(|| ProtocolError::MalformedMessage(format!("{msg_type} is not a handshake message")))?;

        if step <= self.last_received_step && !self.state.is_terminal() {
            if step == 1 && !self.is_same_init(data) {
                return Err(ProtocolError::HandshakeInProgress);
            }
            let resend = match self.role {
                Role::Responder => self.last_sent.clone(),
                Role::Initiator => None,
            };
            return Ok(HandshakeStep::Duplicate(resend));
        }

        let result = match (self.role, step) {
            (Role::Initiator, 2) => self.on_ack(identity, decode_payload(data)?, now),
            (Role::Initiator, 4) => self.on_session(decode_payload(data)?, now),
            (Role::Initiator, 6) => self.on_ready(decode_payload(data)?, now),
            (Role::Responder, 3) => self.on_challenge_response(identity, decode_payload(data)?, now),
            (Role::Responder, 5) => self.on_confirm(decode_payload(data)?, now),
            _ => Err(ProtocolError::InvalidState {
                state: self.state.to_string(),
                event: msg_type.to_string(),
            }),
        };
        if result.is_ok() {
            self.last_received_step = step;
        }
        result
    }

    // =========================================================================
    // Application data
    // =========================================================================

    fn usable_keys(&self, now: Timestamp) -> Result<&SessionKeys, ProtocolError> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Expired => return Err(ProtocolError::SessionExpired),
            _ => return Err(ProtocolError::EncryptionNotReady),
        }
        let keys = self.keys.as_ref().ok_or(ProtocolError::EncryptionNotReady)?;
        keys.check_fresh(now.as_millis())?;
        Ok(keys)
    }

    /// Reserve the next outbound sequence number.
    pub fn next_send_seq(&mut self) -> Result<u64, ProtocolError> {
        if !self.is_ready() {
            return Err(ProtocolError::EncryptionNotReady);
        }
        let seq = self.send_seq;
        self.send_seq += 1;
        Ok(seq)
    }

    /// Encrypt `plaintext` bound to `aad`.
    ///
    /// # Errors
    ///
    /// - `EncryptionNotReady` before READY
    /// - `SessionExpired` past the session lifetime
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8], now: Timestamp) -> Result<Payload, ProtocolError> {
        let keys = self.usable_keys(now)?;
        let nonce = Nonce::generate();
        let ciphertext = aead_encrypt(keys.encryption_key(), &nonce, plaintext, aad)?;
        Ok(Payload::sealed(ciphertext, nonce))
    }

    /// Decrypt an encrypted payload bound to `aad`.
    pub fn decrypt(&self, payload: &Payload, aad: &[u8], now: Timestamp) -> Result<Vec<u8>, ProtocolError> {
        let keys = self.usable_keys(now)?;
        let nonce = match (payload.encrypted, payload.aead_nonce) {
            (true, Some(nonce)) => nonce,
            _ => return Err(ProtocolError::MalformedMessage("payload is not sealed".into())),
        };
        Ok(aead_decrypt(keys.encryption_key(), &nonce, &payload.data, aad)?)
    }

    /// Run an inbound sequence number through the replay window.
    pub fn check_sequence(&mut self, seq: u64) -> Result<WindowVerdict, ProtocolError> {
        if !self.is_ready() {
            return Err(ProtocolError::EncryptionNotReady);
        }
        self.recv_window.check_and_mark(seq)
    }

    /// Is `msg_type` allowed on this session?
    pub fn check_capability(&self, msg_type: &MessageType) -> Result<(), ProtocolError> {
        match msg_type.required_capability() {
            Some(cap) if !self.has_capability(&cap) => {
                Err(ProtocolError::CapabilityNotNegotiated(cap))
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Expire the session if its deadline passed. Returns `true` when this
    /// call expired it.
    pub fn check_expiry(&mut self, now: Timestamp) -> bool {
        if self.state.is_terminal() || now < self.expires_at {
            return false;
        }
        if self.state.is_handshaking() {
            warn!(session = %self.session_id, peer = ?self.peer_id, state = %self.state, "handshake timed out");
        } else {
            info!(session = %self.session_id, peer = ?self.peer_id, "session lifetime ended");
        }
        self.apply(SessionEvent::Timeout).is_ok()
    }

    /// The initiator's last handshake message, if it is due for another
    /// send. Counts the attempt.
    pub fn due_retransmit(&mut self, now: Timestamp) -> Option<HandshakeFrame> {
        if self.role != Role::Initiator || !self.state.is_handshaking() {
            return None;
        }
        if self.retransmits >= self.config.max_retransmits
            || now.since(self.last_sent_at) < self.config.retransmit_interval
        {
            return None;
        }
        let frame = self.last_sent.clone()?;
        self.retransmits += 1;
        self.last_sent_at = now;
        debug!(
            session = %self.session_id,
            msg_type = %frame.msg_type,
            attempt = self.retransmits,
            "retransmitting handshake message"
        );
        Some(frame)
    }

    /// Tear down: zeroize keys and end the session.
    pub fn close(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.apply(SessionEvent::Close);
        }
        self.wipe();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("send_seq", &self.send_seq)
            .field("expected_recv_seq", &self.recv_window.expected())
            .finish_non_exhaustive()
    }
}
