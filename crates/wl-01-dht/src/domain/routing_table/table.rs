//! Main RoutingTable implementation.

use parking_lot::RwLock;

use super::bucket::KBucket;
use super::security::InsertOutcome;
use super::NUM_BUCKETS;
use crate::domain::{bucket_index, cmp_distance, DhtConfig, NodeId, NodeInfo, Timestamp};

/// The routing table implementing Kademlia DHT
///
/// # Concurrency
/// Each bucket sits behind its own `RwLock`, so lookups and inserts that
/// touch different distance ranges never contend.
#[derive(Debug)]
pub struct RoutingTable {
    /// Our own node ID (immutable after creation)
    local_id: NodeId,
    /// 160 k-buckets, one per bit of distance
    buckets: Vec<RwLock<KBucket>>,
    /// Bucket sizing and eviction parameters
    config: DhtConfig,
}

impl RoutingTable {
    /// Create a new routing table
    pub fn new(local_id: NodeId, config: DhtConfig, now: Timestamp) -> Self {
        let buckets = (0..NUM_BUCKETS)
            .map(|_| RwLock::new(KBucket::new(now)))
            .collect();

        Self {
            local_id,
            buckets,
            config,
        }
    }

    /// Get our local node ID
    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Get the configuration
    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    /// Total node count across all buckets
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.read().len()).sum()
    }

    /// `true` when no remote node is known
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.read().is_empty())
    }

    /// Record contact with `node`.
    pub fn observe(&self, node: NodeInfo, now: Timestamp) -> InsertOutcome {
        let Some(idx) = bucket_index(&self.local_id, &node.node_id) else {
            return InsertOutcome::IsSelf;
        };
        self.buckets[idx].write().observe(
            node,
            self.config.k,
            now,
            self.config.node_stale_after,
            self.config.eviction_challenge_timeout,
        )
    }

    /// Handle challenge response (PING/PONG result)
    pub fn on_challenge_result(&self, challenged: &NodeId, alive: bool, now: Timestamp) -> bool {
        let Some(idx) = bucket_index(&self.local_id, challenged) else {
            return false;
        };
        self.buckets[idx]
            .write()
            .resolve_challenge(challenged, alive, now)
    }

    /// Treat challenges past their deadline as failed (challenged node dead).
    /// Returns the evicted node ids.
    pub fn check_expired_challenges(&self, now: Timestamp) -> Vec<NodeId> {
        let mut evicted = Vec::new();
        for bucket in &self.buckets {
            let mut bucket = bucket.write();
            let expired = bucket
                .pending_insertion
                .as_ref()
                .filter(|p| now >= p.challenge_deadline)
                .map(|p| p.challenged);
            if let Some(challenged) = expired {
                if bucket.resolve_challenge(&challenged, false, now) {
                    evicted.push(challenged);
                }
            }
        }
        evicted
    }

    /// Look up a node.
    pub fn get(&self, node_id: &NodeId) -> Option<NodeInfo> {
        let idx = bucket_index(&self.local_id, node_id)?;
        self.buckets[idx]
            .read()
            .nodes()
            .iter()
            .find(|n| &n.node_id == node_id)
            .cloned()
    }

    /// Remove a node from the routing table
    pub fn remove(&self, node_id: &NodeId) -> Option<NodeInfo> {
        let idx = bucket_index(&self.local_id, node_id)?;
        self.buckets[idx].write().remove(node_id)
    }

    /// Find the `count` closest nodes to a target, closest first
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<NodeInfo> {
        let mut all: Vec<NodeInfo> = self
            .buckets
            .iter()
            .flat_map(|b| b.read().nodes().to_vec())
            .collect();

        all.sort_by(|a, b| cmp_distance(target, &a.node_id, &b.node_id));
        all.truncate(count);
        all
    }

    /// Every known node.
    pub fn all_nodes(&self) -> Vec<NodeInfo> {
        self.buckets
            .iter()
            .flat_map(|b| b.read().nodes().to_vec())
            .collect()
    }

    /// Non-empty buckets whose range has not been looked up for
    /// `refresh_interval`.
    pub fn buckets_needing_refresh(&self, now: Timestamp) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                let b = b.read();
                !b.is_empty() && now.since(b.last_refreshed()) >= self.config.refresh_interval
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Record that a lookup covered the bucket holding `target`.
    pub fn mark_refreshed(&self, target: &NodeId, now: Timestamp) {
        if let Some(idx) = bucket_index(&self.local_id, target) {
            self.buckets[idx].write().last_refreshed = now;
        }
    }

    /// Snapshot of one bucket.
    pub fn bucket(&self, index: usize) -> Option<KBucket> {
        self.buckets.get(index).map(|b| b.read().clone())
    }
}
