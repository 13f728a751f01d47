//! Engine state, construction and shared plumbing.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shared_crypto::IdentityKeyPair;
use shared_types::{
    Envelope, MessageClass, MessageType, NonceCache, Payload, PeerId, ProtocolError, SendError,
    TimeSource, Timestamp, TransportError,
};
use tracing::{debug, trace};
use uuid::Uuid;
use wl_02_session::{HandshakeFrame, Role, Session, SessionConfig, SessionState};
use wl_03_admission::RateLimiter;
use wl_04_chunking::ChunkManager;

use crate::domain::{DecodedMessage, EngineConfig, RetransmitRing};
use crate::ports::{AddressBook, DeliveryHook, MessageHandler, Transport};

/// A session plus what the engine tracks beside it. One lock per session.
pub(crate) struct SessionSlot {
    pub(crate) session: Session,
    pub(crate) ring: RetransmitRing,
    /// Why the handshake failed, for the `send` waiting on it.
    pub(crate) failure: Option<ProtocolError>,
}

impl SessionSlot {
    pub(crate) fn new(session: Session, ring_capacity: usize) -> Self {
        Self {
            session,
            ring: RetransmitRing::new(ring_capacity),
            failure: None,
        }
    }
}

pub(crate) type SlotRef = Arc<Mutex<SessionSlot>>;

/// The session protocol engine.
///
/// Owns every session this node has with its peers, at most one per
/// (peer, role), and runs the inbound validation pipeline.
///
/// # Concurrency
///
/// Sessions sit in a sharded map, each behind its own mutex. No session
/// lock is ever held across an `.await` or while touching the map.
pub struct SessionProtocolEngine {
    pub(crate) this: Weak<SessionProtocolEngine>,
    pub(crate) identity: Arc<IdentityKeyPair>,
    pub(crate) local_id: PeerId,
    pub(crate) sessions: DashMap<(PeerId, Role), SlotRef>,
    /// Session ids that must never be used again, with when they died.
    pub(crate) tombstones: DashMap<Uuid, Timestamp>,
    /// Classes a peer asked us to hold off on, until when.
    pub(crate) backoff: DashMap<(PeerId, MessageClass), Timestamp>,
    pub(crate) nonces: NonceCache,
    pub(crate) limiter: RateLimiter,
    pub(crate) chunks: ChunkManager,
    pub(crate) handlers: DashMap<MessageType, Arc<dyn MessageHandler>>,
    pub(crate) delivery_hook: RwLock<Option<Arc<dyn DeliveryHook>>>,
    pub(crate) address_book: Arc<dyn AddressBook>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) time_source: Arc<dyn TimeSource>,
    pub(crate) session_config: Arc<SessionConfig>,
    pub(crate) config: EngineConfig,
}

impl SessionProtocolEngine {
    /// Create an engine speaking for `identity`.
    pub fn new(
        identity: Arc<IdentityKeyPair>,
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        address_book: Arc<dyn AddressBook>,
        time_source: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let local_id = PeerId::from_public_key(&identity.public_key());
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            local_id,
            sessions: DashMap::new(),
            tombstones: DashMap::new(),
            backoff: DashMap::new(),
            nonces: NonceCache::new(config.replay.clone()),
            limiter: RateLimiter::new(config.admission.clone(), time_source.clone()),
            chunks: ChunkManager::new(config.chunking.clone(), time_source.clone()),
            handlers: DashMap::new(),
            delivery_hook: RwLock::new(None),
            address_book,
            transport,
            time_source,
            session_config: Arc::new(config.session.clone()),
            identity,
            config,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// This node's peer id.
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Admission control.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Reassembly buffers.
    pub fn chunk_manager(&self) -> &ChunkManager {
        &self.chunks
    }

    /// Number of sessions held, any state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// State of the most advanced session with `peer`.
    pub fn session_state(&self, peer: &PeerId) -> Option<SessionState> {
        [Role::Initiator, Role::Responder]
            .into_iter()
            .filter_map(|role| self.slot(peer, role))
            .map(|slot| slot.lock().session.state())
            .max_by_key(SessionState::progress)
    }

    /// Route every application message of `msg_type` to `handler`,
    /// replacing any previous handler for that type.
    pub fn register_handler<H: MessageHandler + 'static>(&self, msg_type: MessageType, handler: H) {
        debug!(%msg_type, "handler registered");
        self.handlers.insert(msg_type, Arc::new(handler));
    }

    /// Remove the handler for `msg_type`.
    pub fn unregister_handler(&self, msg_type: &MessageType) -> bool {
        self.handlers.remove(msg_type).is_some()
    }

    /// Install the hook called for every delivered application message.
    pub fn set_delivery_hook<H: DeliveryHook + 'static>(&self, hook: H) {
        *self.delivery_hook.write() = Some(Arc::new(hook));
    }

    // =========================================================================
    // Session lookup
    // =========================================================================

    pub(crate) fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    pub(crate) fn slot(&self, peer: &PeerId, role: Role) -> Option<SlotRef> {
        self.sessions.get(&(*peer, role)).map(|e| e.value().clone())
    }

    /// The session with `peer` whose id is `session_id`, optionally only
    /// in `role`.
    pub(crate) fn slot_for_session(
        &self,
        peer: &PeerId,
        session_id: Uuid,
        role: Option<Role>,
    ) -> Option<SlotRef> {
        let roles = match role {
            Some(role) => vec![role],
            None => vec![Role::Initiator, Role::Responder],
        };
        roles
            .into_iter()
            .filter_map(|role| self.slot(peer, role))
            .find(|slot| slot.lock().session.session_id() == session_id)
    }

    /// A READY session with `peer`, ours first.
    pub(crate) fn ready_slot(&self, peer: &PeerId) -> Option<SlotRef> {
        [Role::Initiator, Role::Responder]
            .into_iter()
            .filter_map(|role| self.slot(peer, role))
            .find(|slot| slot.lock().session.is_ready())
    }

    pub(crate) fn tombstone(&self, session_id: Uuid, now: Timestamp) {
        self.tombstones.entry(session_id).or_insert(now);
    }

    pub(crate) fn is_tombstoned(&self, session_id: &Uuid) -> bool {
        self.tombstones.contains_key(session_id)
    }

    /// Remove `slot` from the table if it is still the one registered.
    pub(crate) fn forget(&self, peer: &PeerId, slot: &SlotRef) {
        for role in [Role::Initiator, Role::Responder] {
            self.sessions
                .remove_if(&(*peer, role), |_, held| Arc::ptr_eq(held, slot));
        }
    }

    /// Apply `slot`'s deadline as of `now`. A session that is (or just
    /// became) terminal leaves the table and its id is tombstoned.
    ///
    /// Must not be called while holding an entry of `sessions`.
    pub(crate) fn expire_if_due(&self, peer: &PeerId, slot: &SlotRef, now: Timestamp) -> bool {
        let (terminal, session_id) = {
            let mut guard = slot.lock();
            guard.session.check_expiry(now);
            (guard.session.state().is_terminal(), guard.session.session_id())
        };
        if terminal {
            self.forget(peer, slot);
            self.tombstone(session_id, now);
        }
        terminal
    }

    // =========================================================================
    // Outbound plumbing
    // =========================================================================

    /// Resolve `peer` and hand `envelope` to the transport.
    pub(crate) async fn deliver(&self, peer: &PeerId, envelope: &Envelope) -> Result<(), SendError> {
        let address = self
            .address_book
            .resolve(peer)
            .await
            .ok_or_else(|| TransportError::Unreachable(format!("no address for {}", peer.short())))?;
        let frame = envelope.to_bytes()?;
        trace!(peer = ?peer, msg_type = %envelope.msg_type, seq = envelope.sequence_num, "sending frame");

        let deadline = self.config.delivery_timeout;
        match tokio::time::timeout(deadline, self.transport.send(&address, frame)).await {
            Ok(result) => result.map_err(SendError::from),
            Err(_) => Err(TransportError::Timeout(deadline).into()),
        }
    }

    /// Send a handshake message under a fresh envelope.
    pub(crate) async fn send_handshake(
        &self,
        peer: PeerId,
        session_id: Uuid,
        frame: HandshakeFrame,
    ) -> Result<(), SendError> {
        let envelope = Envelope::new(
            frame.msg_type,
            self.local_id,
            peer,
            Some(session_id),
            0,
            self.now(),
            Payload::plain(frame.data),
        )
        .signed(&self.identity)?;
        self.deliver(&peer, &envelope).await
    }

    /// Encrypt and sign `plaintext` under sequence number `seq`.
    pub(crate) fn seal(
        &self,
        session: &Session,
        peer: PeerId,
        msg_type: MessageType,
        seq: u64,
        plaintext: &[u8],
    ) -> Result<Envelope, ProtocolError> {
        let now = self.now();
        let mut envelope = Envelope::new(
            msg_type,
            self.local_id,
            peer,
            Some(session.session_id()),
            seq,
            now,
            Payload::plain(Vec::new()),
        );
        envelope.payload = session.encrypt(plaintext, &envelope.aad()?, now)?;
        envelope.sign(&self.identity)?;
        Ok(envelope)
    }

    /// Take the next sequence number, seal, remember for gap-fill, send.
    /// Returns the sequence number used.
    pub(crate) async fn send_sealed(
        &self,
        slot: &SlotRef,
        peer: PeerId,
        msg_type: MessageType,
        plaintext: Vec<u8>,
    ) -> Result<u64, SendError> {
        let (envelope, seq) = {
            let mut slot = slot.lock();
            let seq = slot.session.next_send_seq()?;
            let envelope = self.seal(&slot.session, peer, msg_type.clone(), seq, &plaintext)?;
            slot.ring.push(seq, msg_type, plaintext);
            (envelope, seq)
        };
        self.deliver(&peer, &envelope).await?;
        Ok(seq)
    }

    /// Hand a decoded message to its handler and the delivery hook.
    pub(crate) fn dispatch(&self, message: DecodedMessage) -> DecodedMessage {
        let handler = self
            .handlers
            .get(&message.msg_type)
            .map(|h| h.value().clone());
        match handler {
            Some(handler) => handler.handle(&message),
            None => debug!(msg_type = %message.msg_type, "no handler registered"),
        }

        let hook = self.delivery_hook.read().clone();
        if let Some(hook) = hook {
            hook.on_delivered(&message);
        }
        message
    }
}

impl std::fmt::Debug for SessionProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProtocolEngine")
            .field("local_id", &self.local_id)
            .field("sessions", &self.sessions.len())
            .field("tombstones", &self.tombstones.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
