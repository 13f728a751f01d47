//! The peer service: one node's engine, DHT and address book.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use shared_crypto::IdentityKeyPair;
use shared_types::{MessageType, PeerAddress, PeerId, ReceiveError, SendError, TimeSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wl_01_dht::{
    dht_key, DhtError, DhtNode, DhtRequest, DhtResponse, DhtRpcHandler, DhtTransport, DhtValue,
    WILDCARD_CAPABILITY,
};
use wl_05_protocol_engine::{
    DeliveryHook, DeliveryReceipt, FrameHandler, Inbound, MessageHandler, SessionProtocolEngine,
    SessionState, Transport,
};

use super::handle::ServiceHandle;
use crate::adapters::DhtAddressBook;
use crate::domain::PeerServiceConfig;

/// Binds discovery to the session protocol engine.
///
/// Peers are addressed by [`PeerId`] only; where to reach them is found
/// through the DHT and cached.
pub struct PeerService {
    identity: Arc<IdentityKeyPair>,
    engine: Arc<SessionProtocolEngine>,
    dht: Arc<DhtNode>,
    addresses: Arc<DhtAddressBook>,
    time_source: Arc<dyn TimeSource>,
    config: PeerServiceConfig,
}

impl PeerService {
    /// Assemble a node reachable at `address`.
    pub fn new(
        identity: Arc<IdentityKeyPair>,
        address: PeerAddress,
        config: PeerServiceConfig,
        transport: Arc<dyn Transport>,
        dht_transport: Arc<dyn DhtTransport>,
        time_source: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let dht = DhtNode::new(
            identity.clone(),
            address,
            config.dht.clone(),
            dht_transport,
            time_source.clone(),
        );
        let addresses = Arc::new(DhtAddressBook::new(
            dht.clone(),
            config.address_cache_ttl,
            time_source.clone(),
        ));
        let engine = SessionProtocolEngine::new(
            identity.clone(),
            config.engine.clone(),
            transport,
            addresses.clone(),
            time_source.clone(),
        );
        Arc::new(Self {
            identity,
            engine,
            dht,
            addresses,
            time_source,
            config,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn local_id(&self) -> PeerId {
        self.engine.local_id()
    }

    pub fn address(&self) -> &PeerAddress {
        self.dht.address()
    }

    pub fn engine(&self) -> &Arc<SessionProtocolEngine> {
        &self.engine
    }

    pub fn dht(&self) -> &Arc<DhtNode> {
        &self.dht
    }

    pub fn address_book(&self) -> &DhtAddressBook {
        &self.addresses
    }

    pub fn config(&self) -> &PeerServiceConfig {
        &self.config
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Send an application message, resolving and handshaking as needed.
    pub async fn send(
        &self,
        peer: PeerId,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<DeliveryReceipt, SendError> {
        self.engine.send(peer, msg_type, payload).await
    }

    /// Process one inbound session frame.
    pub async fn receive(&self, raw: &[u8]) -> Result<Inbound, ReceiveError> {
        self.engine.receive(raw).await
    }

    /// Route application messages of `msg_type` to `handler`.
    pub fn register_handler<H: MessageHandler + 'static>(&self, msg_type: MessageType, handler: H) {
        self.engine.register_handler(msg_type, handler);
    }

    /// Install the hook called for every delivered message.
    pub fn set_delivery_hook<H: DeliveryHook + 'static>(&self, hook: H) {
        self.engine.set_delivery_hook(hook);
    }

    /// State of the most advanced session with `peer`.
    pub fn get_session_state(&self, peer: &PeerId) -> Option<SessionState> {
        self.engine.session_state(peer)
    }

    /// Close every session with `peer`.
    pub async fn teardown(&self, peer: PeerId) -> Result<usize, SendError> {
        self.engine.teardown(peer).await
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Join the network through `seeds`.
    pub async fn bootstrap(&self, seeds: &[PeerAddress]) -> Result<usize, DhtError> {
        self.dht.bootstrap(seeds).await
    }

    /// Serve one remote DHT call.
    pub async fn handle_dht_request(&self, request: DhtRequest) -> DhtResponse {
        self.dht.handle_request(request).await
    }

    /// Publish `entity_id` as reachable here, under the wildcard key and
    /// under one key per capability. The value is signed by this node.
    ///
    /// Returns the number of remote replicas written across all keys.
    pub async fn register_entity(
        &self,
        entity_id: &str,
        capabilities: &[String],
    ) -> Result<usize, DhtError> {
        let mut value = DhtValue {
            entity_id: entity_id.to_string(),
            addresses: vec![self.address().clone()],
            public_key: self.identity.public_key(),
            capabilities: capabilities.to_vec(),
            last_seen: self.time_source.now(),
            ttl_secs: self.config.dht.value_ttl.as_secs(),
            signature: None,
        };
        value
            .sign(&self.identity)
            .map_err(|e| DhtError::Rejected(e.to_string()))?;

        let keys = std::iter::once(WILDCARD_CAPABILITY)
            .chain(capabilities.iter().map(String::as_str))
            .map(|capability| dht_key(entity_id, capability));
        let stores = keys.map(|key| self.dht.store(key, value.clone()));

        let mut replicas = 0;
        let mut failures = 0;
        for result in join_all(stores).await {
            match result {
                Ok(accepted) => replicas += accepted,
                Err(err) => {
                    failures += 1;
                    debug!(entity = %entity_id, error = %err, "registration key not replicated");
                }
            }
        }
        if replicas == 0 {
            warn!(entity = %entity_id, "registration reached no remote node");
            return Err(DhtError::StoreFailed);
        }
        info!(
            entity = %entity_id,
            capabilities = capabilities.len(),
            replicas,
            failures,
            "entity registered"
        );
        Ok(replicas)
    }

    /// Publish this node under its own peer id.
    pub async fn register_self(&self, capabilities: &[String]) -> Result<usize, DhtError> {
        self.register_entity(&self.local_id().to_hex(), capabilities)
            .await
    }

    /// Look up an entity's registration.
    pub async fn dht_find_entity(&self, entity_id: &str) -> Result<Option<DhtValue>, DhtError> {
        self.dht_find_entity_with_capability(entity_id, WILDCARD_CAPABILITY)
            .await
    }

    /// Look up an entity offering `capability`.
    ///
    /// Values that fail their signature or do not belong to `entity_id`
    /// are treated as absent.
    pub async fn dht_find_entity_with_capability(
        &self,
        entity_id: &str,
        capability: &str,
    ) -> Result<Option<DhtValue>, DhtError> {
        let key = dht_key(entity_id, capability);
        let found = self.dht.find_value(&key).await?;
        Ok(found.filter(|value| {
            value.entity_id == entity_id
                && value.verify()
                && value.owner_matches()
                && value.has_capability(capability)
        }))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn engine and DHT maintenance. Dropping or shutting down the
    /// returned handle stops them.
    pub fn start(self: &Arc<Self>) -> ServiceHandle {
        let (shutdown, rx) = watch::channel(false);
        let tick = self.config.maintenance_tick;
        let tasks = vec![
            self.engine.spawn_maintenance(tick, rx.clone()),
            self.dht.spawn_maintenance(tick, rx),
        ];
        info!(peer = ?self.local_id(), address = %self.address(), "peer service started");
        ServiceHandle::new(shutdown, tasks)
    }
}

#[async_trait]
impl FrameHandler for PeerService {
    async fn handle_frame(&self, frame: Vec<u8>) {
        self.engine.handle_frame(frame).await;
    }
}

#[async_trait]
impl DhtRpcHandler for PeerService {
    async fn handle_request(&self, request: DhtRequest) -> DhtResponse {
        self.handle_dht_request(request).await
    }
}

impl std::fmt::Debug for PeerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerService")
            .field("local_id", &self.local_id())
            .field("address", self.address())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
