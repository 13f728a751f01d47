//! K-Bucket implementation for Kademlia routing.

use super::security::{InsertOutcome, PendingInsertion};
use crate::domain::{NodeId, NodeInfo, Timestamp};
use std::time::Duration;

/// A k-bucket storing up to k nodes at a specific distance range
///
/// Entries are ordered least-recently-seen first. The bucket owns its
/// eviction policy: a full bucket evicts its oldest entry only if that
/// entry is stale, otherwise it challenges the entry (see
/// [`PendingInsertion`]).
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Nodes in this bucket (max size = k)
    pub(crate) nodes: Vec<NodeInfo>,
    /// Last time a lookup touched this bucket's range
    pub(crate) last_refreshed: Timestamp,
    /// Node waiting to join this bucket, pending eviction challenge result.
    pub(crate) pending_insertion: Option<PendingInsertion>,
}

impl KBucket {
    /// Create a new empty k-bucket
    pub fn new(now: Timestamp) -> Self {
        Self {
            nodes: Vec::new(),
            last_refreshed: now,
            pending_insertion: None,
        }
    }

    /// Get the number of nodes in this bucket
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the bucket is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if the bucket is full
    pub fn is_full(&self, k: usize) -> bool {
        self.nodes.len() >= k
    }

    /// Get the oldest node (least recently seen)
    pub fn oldest(&self) -> Option<&NodeInfo> {
        self.nodes.first()
    }

    /// Get all nodes in this bucket, least recently seen first
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Check if a challenge is already in progress
    pub fn has_pending_challenge(&self) -> bool {
        self.pending_insertion.is_some()
    }

    /// Last refresh instant.
    pub fn last_refreshed(&self) -> Timestamp {
        self.last_refreshed
    }

    /// Check if bucket contains a node
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.node_id == node_id)
    }

    /// Insert or refresh `node` under the bucket's eviction policy.
    pub(crate) fn observe(
        &mut self,
        mut node: NodeInfo,
        k: usize,
        now: Timestamp,
        stale_after: Duration,
        challenge_timeout: Duration,
    ) -> InsertOutcome {
        node.last_seen = now;

        if let Some(pos) = self.nodes.iter().position(|n| n.node_id == node.node_id) {
            self.nodes.remove(pos);
            self.nodes.push(node);
            return InsertOutcome::Refreshed;
        }

        if !self.is_full(k) {
            self.nodes.push(node);
            return InsertOutcome::Inserted;
        }

        // Full: the least-recently-seen entry goes only if it is stale.
        if let Some(oldest) = self.nodes.first() {
            if oldest.is_stale(now, stale_after) {
                let evicted = self.nodes.remove(0).node_id;
                self.nodes.push(node);
                return InsertOutcome::EvictedStale(evicted);
            }
        }

        if self.has_pending_challenge() {
            return InsertOutcome::Rejected;
        }

        let Some(oldest) = self.nodes.first().cloned() else {
            return InsertOutcome::Rejected;
        };
        self.pending_insertion = Some(PendingInsertion {
            candidate: node,
            challenged: oldest.node_id,
            challenge_deadline: now.saturating_add(challenge_timeout),
        });
        InsertOutcome::Challenge(oldest)
    }

    /// Remove a node by id.
    pub(crate) fn remove(&mut self, node_id: &NodeId) -> Option<NodeInfo> {
        self.nodes
            .iter()
            .position(|n| &n.node_id == node_id)
            .map(|pos| self.nodes.remove(pos))
    }

    /// Move a node to the most-recently-seen end.
    pub(crate) fn touch(&mut self, node_id: &NodeId, now: Timestamp) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| &n.node_id == node_id) {
            let mut node = self.nodes.remove(pos);
            node.last_seen = now;
            self.nodes.push(node);
            true
        } else {
            false
        }
    }

    /// Resolve the running challenge. A dead challenged node is replaced by
    /// the candidate; a live one is refreshed and the candidate dropped.
    pub(crate) fn resolve_challenge(&mut self, challenged: &NodeId, alive: bool, now: Timestamp) -> bool {
        let Some(pending) = self.pending_insertion.take() else {
            return false;
        };
        if &pending.challenged != challenged {
            self.pending_insertion = Some(pending);
            return false;
        }

        if alive {
            self.touch(challenged, now);
        } else {
            self.remove(challenged);
            let mut candidate = pending.candidate;
            candidate.last_seen = now;
            self.nodes.push(candidate);
        }
        true
    }
}
