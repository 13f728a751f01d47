use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use shared_crypto::IdentityKeyPair;
use shared_types::{PeerAddress, PeerId, TransportError};
use tracing::{debug, trace};

use crate::domain::{
    DhtConfig, DhtRequest, DhtResponse, DhtValue, InsertOutcome, NodeId, NodeInfo, RoutingTable,
    Timestamp, ValueStore,
};
use crate::ports::{DhtTransport, TimeSource};

/// A Kademlia node.
///
/// Always handled through an `Arc`: eviction challenges and the background
/// loops run as spawned tasks that hold a reference to the node.
///
/// # Example
///
/// ```rust,ignore
/// let node = DhtNode::new(identity, PeerAddress::new("mem://a"), DhtConfig::default(),
///                         transport, Arc::new(SystemTimeSource::new()));
/// node.bootstrap(&[PeerAddress::new("mem://seed")]).await?;
/// let value = node.find_value(&key).await?;
/// ```
pub struct DhtNode {
    pub(crate) this: Weak<DhtNode>,
    pub(crate) identity: Arc<IdentityKeyPair>,
    pub(crate) local: NodeInfo,
    pub(crate) routing_table: RoutingTable,
    pub(crate) values: ValueStore,
    /// Values registered through this node, re-stored on republish.
    pub(crate) published: DashMap<NodeId, DhtValue>,
    pub(crate) last_republish: Mutex<Timestamp>,
    pub(crate) transport: Arc<dyn DhtTransport>,
    pub(crate) time_source: Arc<dyn TimeSource>,
    pub(crate) config: DhtConfig,
}

impl DhtNode {
    /// Create a node with a fresh random id.
    pub fn new(
        identity: Arc<IdentityKeyPair>,
        address: PeerAddress,
        config: DhtConfig,
        transport: Arc<dyn DhtTransport>,
        time_source: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        Self::with_node_id(NodeId::random(), identity, address, config, transport, time_source)
    }

    /// Create a node with a chosen id.
    pub fn with_node_id(
        node_id: NodeId,
        identity: Arc<IdentityKeyPair>,
        address: PeerAddress,
        config: DhtConfig,
        transport: Arc<dyn DhtTransport>,
        time_source: Arc<dyn TimeSource>,
    ) -> Arc<Self> {
        let now = time_source.now();
        let local = NodeInfo::new(node_id, address, identity.public_key(), now);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            identity,
            routing_table: RoutingTable::new(node_id, config.clone(), now),
            values: ValueStore::new(config.max_value_ttl, config.max_values),
            published: DashMap::new(),
            last_republish: Mutex::new(now),
            local,
            transport,
            time_source,
            config,
        })
    }

    /// Our node id.
    pub fn node_id(&self) -> NodeId {
        self.local.node_id
    }

    /// Our address.
    pub fn address(&self) -> &PeerAddress {
        &self.local.address
    }

    /// Peer id of the identity key this node signs with.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.identity.public_key())
    }

    /// The routing table.
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// The local value store.
    pub fn value_store(&self) -> &ValueStore {
        &self.values
    }

    /// Configuration in use.
    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    /// Identity keypair, for signing values published through this node.
    pub fn identity(&self) -> &IdentityKeyPair {
        &self.identity
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// Our own record, stamped with the current time.
    pub(crate) fn local_info(&self) -> NodeInfo {
        let mut info = self.local.clone();
        info.last_seen = self.now();
        info
    }

    /// One RPC with the per-call timeout. A reply's sender is observed into
    /// the routing table.
    pub(crate) async fn rpc(
        &self,
        to: &PeerAddress,
        request: DhtRequest,
    ) -> Result<DhtResponse, TransportError> {
        let name = request.name();
        let reply = tokio::time::timeout(self.config.rpc_timeout, self.transport.call(to, request))
            .await
            .map_err(|_| TransportError::Timeout(self.config.rpc_timeout))?;

        match reply {
            Ok(response) => {
                self.observe(response.responder().clone());
                Ok(response)
            }
            Err(e) => {
                debug!(rpc = name, to = %to, error = %e, "DHT RPC failed");
                Err(e)
            }
        }
    }

    /// Record contact with `node`. A full bucket with a fresh oldest entry
    /// gets that entry challenged in the background.
    pub(crate) fn observe(&self, node: NodeInfo) {
        let node_id = node.node_id;
        match self.routing_table.observe(node, self.now()) {
            InsertOutcome::Challenge(oldest) => self.spawn_challenge(oldest),
            InsertOutcome::EvictedStale(evicted) => {
                debug!(evicted = ?evicted, inserted = ?node_id, "evicted stale node");
            }
            outcome => trace!(node = ?node_id, ?outcome, "observed node"),
        }
    }

    /// PING the challenged node. Outside a runtime the challenge is left to
    /// expire through `check_expired_challenges`.
    fn spawn_challenge(&self, oldest: NodeInfo) {
        let (Some(this), Ok(handle)) = (self.this.upgrade(), tokio::runtime::Handle::try_current())
        else {
            return;
        };
        handle.spawn(async move {
            let alive = this.ping(&oldest.address).await.is_ok();
            let now = this.now();
            if this.routing_table.on_challenge_result(&oldest.node_id, alive, now) {
                debug!(challenged = ?oldest.node_id, alive, "eviction challenge resolved");
            }
        });
    }

    /// PING a node by address.
    pub async fn ping(&self, to: &PeerAddress) -> Result<NodeInfo, TransportError> {
        let from = self.local_info();
        let response = self.rpc(to, DhtRequest::Ping { from }).await?;
        Ok(response.responder().clone())
    }
}

impl std::fmt::Debug for DhtNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtNode")
            .field("node_id", &self.local.node_id)
            .field("address", &self.local.address)
            .field("known_nodes", &self.routing_table.len())
            .field("values", &self.values.len())
            .finish()
    }
}
