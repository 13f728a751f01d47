//! In-process DHT network.
//!
//! Routes each call straight to the handler registered under the target
//! address. Requests and responses still go through JSON so the wire types
//! are exercised exactly as a real transport would.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use shared_types::{PeerAddress, TransportError};
use tracing::trace;

use crate::domain::{DhtRequest, DhtResponse};
use crate::ports::{DhtRpcHandler, DhtTransport};

/// Shared in-memory network; clone the `Arc` into every node.
#[derive(Default)]
pub struct InMemoryDhtNetwork {
    handlers: DashMap<PeerAddress, Weak<dyn DhtRpcHandler>>,
    offline: DashSet<PeerAddress>,
}

impl InMemoryDhtNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `handler` reachable at `address`. Only a weak reference is
    /// kept, so dropping the node takes it off the network.
    pub fn register<H: DhtRpcHandler + 'static>(&self, address: PeerAddress, handler: &Arc<H>) {
        let handler: Arc<dyn DhtRpcHandler> = handler.clone();
        self.handlers.insert(address, Arc::downgrade(&handler));
    }

    /// Remove whatever is registered at `address`.
    pub fn unregister(&self, address: &PeerAddress) {
        self.handlers.remove(address);
    }

    /// Simulate a node going silent (or coming back).
    pub fn set_offline(&self, address: &PeerAddress, offline: bool) {
        if offline {
            self.offline.insert(address.clone());
        } else {
            self.offline.remove(address);
        }
    }

    /// Number of registered addresses.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn resolve(&self, to: &PeerAddress) -> Result<Arc<dyn DhtRpcHandler>, TransportError> {
        if self.offline.contains(to) {
            return Err(TransportError::Unreachable(format!("{to} is offline")));
        }
        self.handlers
            .get(to)
            .and_then(|h| h.upgrade())
            .ok_or_else(|| TransportError::Unreachable(format!("no node at {to}")))
    }
}

#[async_trait]
impl DhtTransport for InMemoryDhtNetwork {
    async fn call(
        &self,
        to: &PeerAddress,
        request: DhtRequest,
    ) -> Result<DhtResponse, TransportError> {
        let handler = self.resolve(to)?;
        trace!(rpc = request.name(), to = %to, "in-memory DHT call");

        let wire = serde_json::to_vec(&request)
            .map_err(|e| TransportError::Unreachable(format!("encode: {e}")))?;
        let request: DhtRequest = serde_json::from_slice(&wire)
            .map_err(|e| TransportError::Unreachable(format!("decode: {e}")))?;

        let response = handler.handle_request(request).await;

        let wire = serde_json::to_vec(&response)
            .map_err(|e| TransportError::Unreachable(format!("encode: {e}")))?;
        serde_json::from_slice(&wire)
            .map_err(|e| TransportError::Unreachable(format!("decode: {e}")))
    }
}
