//! Domain Layer - Pure Kademlia logic with no I/O
//!
//! - Node identifiers and XOR distance
//! - Routing table with k-buckets and eviction-on-failure
//! - TTL-bounded value store
//! - RPC message types

pub mod distance;
pub mod entities;
pub mod routing_table;
pub mod rpc;
pub mod value_objects;
pub mod value_store;

pub use distance::{bucket_index, cmp_distance};
pub use entities::{dht_key, DhtValue, NodeId, NodeInfo, ID_BITS, WILDCARD_CAPABILITY};
pub use routing_table::{InsertOutcome, KBucket, PendingInsertion, RoutingTable, NUM_BUCKETS};
pub use rpc::{DhtRequest, DhtResponse};
pub use shared_types::Timestamp;
pub use value_objects::DhtConfig;
pub use value_store::{StoreOutcome, ValueStore};
