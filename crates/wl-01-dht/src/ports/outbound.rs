//! # Driven Ports (Outbound Dependencies)

use crate::domain::{DhtRequest, DhtResponse};
use async_trait::async_trait;
use shared_types::{PeerAddress, TransportError};

/// Request/response transport to remote DHT nodes.
///
/// Implementations classify their raw failures into [`TransportError`].
/// The node wraps every call in its own per-RPC timeout, so an
/// implementation may block as long as the underlying medium does.
#[async_trait]
pub trait DhtTransport: Send + Sync {
    /// Deliver `request` to `to` and wait for the reply.
    async fn call(
        &self,
        to: &PeerAddress,
        request: DhtRequest,
    ) -> Result<DhtResponse, TransportError>;
}
