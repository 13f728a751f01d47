//! Routing Table Implementation
//!
//! Kademlia routing table: 160 k-buckets, each behind its own lock.

// Semantic submodules
mod bucket;
mod security;
mod table;

// Re-export public API
pub use bucket::KBucket;
pub use security::{InsertOutcome, PendingInsertion};
pub use table::RoutingTable;

/// Number of k-buckets (one per bit of NodeId)
pub const NUM_BUCKETS: usize = crate::domain::ID_BITS;
