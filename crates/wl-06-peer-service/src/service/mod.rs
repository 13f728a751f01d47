//! # Peer Service
//!
//! - `peer_service`: the glue between engine, DHT and address book
//! - `handle`: stopping the background loops

mod handle;
mod peer_service;

pub use handle::ServiceHandle;
pub use peer_service::PeerService;
