//! # Wavelink DHT
//!
//! Kademlia distributed hash table used for peer and service discovery.
//!
//! ## Architecture
//!
//! - **Domain Layer:** 160-bit ids, XOR distance, k-buckets with
//!   eviction-on-failure, TTL-bounded value store, RPC messages
//! - **Ports Layer:** `DhtRpcHandler` (inbound) and `DhtTransport` (outbound)
//! - **Service Layer:** `DhtNode` with iterative lookups, replication,
//!   bootstrap and maintenance loops
//! - **Adapters Layer:** in-memory network (feature `memory-transport`)
//!
//! ## Parameters
//!
//! | Parameter | Default |
//! |-----------|---------|
//! | id space | 160 bits |
//! | k | 20 |
//! | alpha | 3 |
//! | value TTL | 86400 s |
//! | bucket refresh | 3600 s |
//! | per-RPC timeout | 5 s |
//!
//! ## Security
//!
//! - STORE is accepted only for values signed by the entity's identity key
//!   and stored under one of that entity's own keys.
//! - A full bucket never drops a responsive node for a newcomer.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    dht_key, DhtConfig, DhtRequest, DhtResponse, DhtValue, InsertOutcome, NodeId, NodeInfo,
    RoutingTable, StoreOutcome, ValueStore, WILDCARD_CAPABILITY,
};
pub use ports::{DhtRpcHandler, DhtTransport};
pub use service::{DhtNode, MaintenanceReport};
pub use shared_types::DhtError;

#[cfg(any(test, feature = "memory-transport"))]
pub use adapters::InMemoryDhtNetwork;
