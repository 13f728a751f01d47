//! # Protocol Engine Service
//!
//! - `engine`: state, construction, session lookup, sealed delivery
//! - `outbound`: send, heartbeat, teardown, handshake retransmission and
//!   gap-fill answers
//! - `inbound`: the receive pipeline and the responder side of the
//!   handshake
//! - `maintenance`: session expiry and cache purging

mod engine;
mod inbound;
mod maintenance;
mod outbound;

pub use engine::SessionProtocolEngine;
pub use maintenance::EngineMaintenanceReport;

#[cfg(test)]
mod tests;
