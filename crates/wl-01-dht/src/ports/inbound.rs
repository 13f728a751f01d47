//! # Driving Ports (Inbound API)

use crate::domain::{DhtRequest, DhtResponse};
use async_trait::async_trait;

/// Serves remote DHT calls.
///
/// Implemented by [`crate::service::DhtNode`]; a transport adapter hands
/// every decoded request to it and ships the response back.
#[async_trait]
pub trait DhtRpcHandler: Send + Sync {
    /// Answer one request. Never fails: refusals are
    /// [`DhtResponse::Rejected`].
    async fn handle_request(&self, request: DhtRequest) -> DhtResponse;
}
