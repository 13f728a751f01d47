//! # Ports
//!
//! - `inbound`: what remote callers drive (`DhtRpcHandler`)
//! - `outbound`: what the node needs from the outside (`DhtTransport`)

pub mod inbound;
pub mod outbound;

pub use inbound::DhtRpcHandler;
pub use outbound::DhtTransport;
pub use shared_types::TimeSource;
