//! Serving remote RPCs.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{DhtRequest, DhtResponse, DhtValue, NodeId, NodeInfo, StoreOutcome};
use crate::ports::DhtRpcHandler;
use crate::service::DhtNode;

#[async_trait]
impl DhtRpcHandler for DhtNode {
    async fn handle_request(&self, request: DhtRequest) -> DhtResponse {
        let caller = request.caller().clone();
        let caller_id = caller.node_id;
        if caller_id != self.local.node_id {
            self.observe(caller);
        }

        let from = self.local_info();
        match request {
            DhtRequest::Ping { .. } => DhtResponse::Pong { from },
            DhtRequest::FindNode { target, .. } => DhtResponse::Nodes {
                from,
                nodes: self.closest_excluding(&target, &caller_id),
            },
            DhtRequest::FindValue { key, .. } => match self.values.get(&key, self.now()) {
                Some(value) => DhtResponse::Value { from, value },
                None => DhtResponse::Nodes {
                    from,
                    nodes: self.closest_excluding(&key, &caller_id),
                },
            },
            DhtRequest::Store { key, value, .. } => match self.accept_store(key, value) {
                Ok(()) => DhtResponse::Stored { from },
                Err(reason) => {
                    debug!(caller = ?caller_id, key = ?key, %reason, "rejected STORE");
                    DhtResponse::Rejected {
                        from,
                        reason: reason.to_string(),
                    }
                }
            },
        }
    }
}

impl DhtNode {
    fn closest_excluding(&self, target: &NodeId, requester: &NodeId) -> Vec<NodeInfo> {
        let mut nodes = self.routing_table.closest(target, self.config.k + 1);
        nodes.retain(|n| &n.node_id != requester);
        nodes.truncate(self.config.k);
        nodes
    }

    /// Remote writes must be signed by the entity, stored under one of the
    /// entity's own keys, and unexpired.
    fn accept_store(&self, key: NodeId, value: DhtValue) -> Result<(), &'static str> {
        if !value.verify() {
            return Err("invalid signature");
        }
        if !value.matches_key(&key) {
            return Err("key does not match entity");
        }
        if !value.owner_matches() {
            return Err("entity not owned by signer");
        }
        match self.values.put(key, value, self.now()) {
            StoreOutcome::Stored | StoreOutcome::Unchanged => Ok(()),
            StoreOutcome::Expired => Err("value expired"),
            StoreOutcome::Full => Err("store full"),
            StoreOutcome::KeyMismatch => Err("entity held by another key"),
        }
    }
}
