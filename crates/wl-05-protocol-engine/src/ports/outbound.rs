//! # Driven Ports (Outbound Dependencies)

use async_trait::async_trait;
use shared_types::{PeerAddress, PeerId, TransportError};

/// One-way frame delivery.
///
/// Implementations classify their raw failures into [`TransportError`].
/// The engine bounds every call with its delivery timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `frame` to the peer at `to`.
    async fn send(&self, to: &PeerAddress, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// Where a peer can be reached.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Current address of `peer`, if known.
    async fn resolve(&self, peer: &PeerId) -> Option<PeerAddress>;
}
