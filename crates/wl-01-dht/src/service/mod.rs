//! # DHT Node Service
//!
//! Wires the pure Kademlia domain to the `DhtTransport` port.
//!
//! - `node`: construction, RPC plumbing, routing-table observation
//! - `lookup`: iterative FIND_NODE / FIND_VALUE, STORE replication, bootstrap
//! - `handler`: serving remote RPCs (`DhtRpcHandler`)
//! - `maintenance`: bucket refresh, republish, expiry and background loops

mod handler;
mod lookup;
mod maintenance;
mod node;

pub use maintenance::MaintenanceReport;
pub use node::DhtNode;
