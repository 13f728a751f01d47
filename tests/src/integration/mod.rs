//! # End-to-End Flows
//!
//! Each module drives real crates end to end over the in-memory
//! transports; nothing is mocked except the wire.

pub mod bootstrap;
pub mod chunking;
pub mod discovery;
pub mod handshake;
