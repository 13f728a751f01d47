//! Routing table security types.
//!
//! SECURITY-CRITICAL: eviction-on-failure bookkeeping. Isolate for audits.

use crate::domain::{NodeId, NodeInfo, Timestamp};

/// A node waiting to be inserted into a full bucket, pending challenge result
///
/// # Security
/// The candidate only gets in if the challenged (least-recently-seen) node
/// fails to answer a PING. Sequentially connecting k fresh identities
/// therefore cannot flush honest, stable nodes.
#[derive(Debug, Clone)]
pub struct PendingInsertion {
    /// The new node waiting to be inserted
    pub candidate: NodeInfo,
    /// The existing node being challenged
    pub challenged: NodeId,
    /// Deadline for the challenge response
    pub challenge_deadline: Timestamp,
}

/// Result of observing a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Added to a bucket with free space.
    Inserted,
    /// Already known; moved to the most-recently-seen end.
    Refreshed,
    /// Bucket full: the stale least-recently-seen entry was replaced.
    EvictedStale(NodeId),
    /// Bucket full of fresh entries: the candidate waits while the oldest
    /// entry is challenged with a PING.
    Challenge(NodeInfo),
    /// Bucket full and a challenge is already running: dropped.
    Rejected,
    /// The local node is never stored.
    IsSelf,
}
