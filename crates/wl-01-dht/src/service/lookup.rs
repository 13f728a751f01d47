//! Iterative lookups, replication and bootstrap.

use std::collections::HashSet;

use futures::future::join_all;
use shared_types::{DhtError, PeerAddress};
use tracing::{debug, info, warn};

use crate::domain::{cmp_distance, DhtRequest, DhtResponse, DhtValue, NodeId, NodeInfo};
use crate::service::DhtNode;

/// What an iterative lookup is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupMode {
    Node,
    Value,
}

/// Result of one iterative lookup.
#[derive(Debug)]
enum LookupOutcome {
    /// Closest nodes seen, failed ones dropped, closest first.
    Closest(Vec<NodeInfo>),
    /// A verified value was returned by some node.
    Found(DhtValue),
    /// Candidates existed but none answered.
    Exhausted,
}

impl DhtNode {
    /// Iterative FIND_NODE: query the `alpha` closest unqueried candidates
    /// per round, merge what they return, and stop once a round brings no
    /// node closer to `target` (after querying the rest of the shortlist).
    ///
    /// Returns up to `k` nodes, closest first. An empty routing table yields
    /// an empty list; candidates that all fail yield `LookupExhausted`.
    pub async fn find_node(&self, target: &NodeId) -> Result<Vec<NodeInfo>, DhtError> {
        match self.lookup(target, LookupMode::Node).await {
            LookupOutcome::Closest(nodes) => Ok(nodes),
            LookupOutcome::Found(_) => Ok(Vec::new()),
            LookupOutcome::Exhausted => Err(DhtError::LookupExhausted),
        }
    }

    /// Find the value under `key`: local store first, then an iterative
    /// FIND_VALUE that short-circuits on the first valid, unexpired hit.
    ///
    /// An exhausted lookup is `Ok(None)`.
    pub async fn find_value(&self, key: &NodeId) -> Result<Option<DhtValue>, DhtError> {
        if let Some(value) = self.values.get(key, self.now()) {
            return Ok(Some(value));
        }

        match self.lookup(key, LookupMode::Value).await {
            LookupOutcome::Found(value) => Ok(Some(value)),
            LookupOutcome::Closest(_) | LookupOutcome::Exhausted => {
                debug!(key = ?key, "value not found");
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`: locally, then on the `k` closest known
    /// nodes in parallel.
    ///
    /// Returns the number of remote replicas that accepted the write;
    /// zero is `StoreFailed`.
    pub async fn store(&self, key: NodeId, value: DhtValue) -> Result<usize, DhtError> {
        let now = self.now();
        let outcome = self.values.put(key, value.clone(), now);
        self.published.insert(key, value.clone());
        debug!(key = ?key, ?outcome, "stored value locally");

        let targets = match self.find_node(&key).await {
            Ok(nodes) if !nodes.is_empty() => nodes,
            _ => self.routing_table.closest(&key, self.config.k),
        };
        if targets.is_empty() {
            warn!(key = ?key, "no remote node to replicate to");
            return Err(DhtError::StoreFailed);
        }

        let from = self.local_info();
        let calls = targets.iter().take(self.config.k).map(|node| {
            let request = DhtRequest::Store {
                from: from.clone(),
                key,
                value: value.clone(),
            };
            self.rpc(&node.address, request)
        });

        let mut accepted = 0;
        for reply in join_all(calls).await {
            match reply {
                Ok(DhtResponse::Stored { .. }) => accepted += 1,
                Ok(DhtResponse::Rejected { from, reason }) => {
                    debug!(node = ?from.node_id, %reason, "STORE rejected");
                }
                Ok(_) | Err(_) => {}
            }
        }

        if accepted == 0 {
            warn!(key = ?key, "no replica accepted STORE");
            return Err(DhtError::StoreFailed);
        }
        debug!(key = ?key, replicas = accepted, "value replicated");
        Ok(accepted)
    }

    /// Join the network through `seeds`: PING each in parallel, then look
    /// up our own id to fill the routing table.
    ///
    /// Returns how many seeds answered; none is `BootstrapFailed`.
    pub async fn bootstrap(&self, seeds: &[PeerAddress]) -> Result<usize, DhtError> {
        let pings = seeds
            .iter()
            .filter(|addr| **addr != self.local.address)
            .map(|addr| self.ping(addr));
        let reached = join_all(pings).await.into_iter().filter(Result::is_ok).count();

        if reached == 0 {
            warn!(seeds = seeds.len(), "bootstrap failed: no seed responded");
            return Err(DhtError::BootstrapFailed);
        }

        let own_id = self.local.node_id;
        if let Err(e) = self.find_node(&own_id).await {
            debug!(error = %e, "self lookup after bootstrap failed");
        }
        info!(
            seeds_reached = reached,
            known_nodes = self.routing_table.len(),
            "DHT bootstrap complete"
        );
        Ok(reached)
    }

    async fn lookup(&self, target: &NodeId, mode: LookupMode) -> LookupOutcome {
        let k = self.config.k;
        let own_id = self.local.node_id;

        let mut shortlist = self.routing_table.closest(target, k);
        if shortlist.is_empty() {
            return LookupOutcome::Closest(Vec::new());
        }

        let mut seen: HashSet<NodeId> = shortlist.iter().map(|n| n.node_id).collect();
        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut failed: HashSet<NodeId> = HashSet::new();
        let mut best = target.distance(&shortlist[0].node_id);

        // Once a round brings nothing closer, the remaining unqueried nodes
        // of the shortlist get one final round and the lookup stops.
        let mut finishing = false;
        for round in 1..=self.config.max_lookup_iterations {
            let width = if finishing { k } else { self.config.alpha };
            let candidates: Vec<NodeInfo> = shortlist
                .iter()
                .filter(|n| !queried.contains(&n.node_id))
                .take(width)
                .cloned()
                .collect();
            if candidates.is_empty() {
                break;
            }
            queried.extend(candidates.iter().map(|n| n.node_id));

            let from = self.local_info();
            let calls = candidates.iter().map(|node| {
                let request = match mode {
                    LookupMode::Node => DhtRequest::FindNode {
                        from: from.clone(),
                        target: *target,
                    },
                    LookupMode::Value => DhtRequest::FindValue {
                        from: from.clone(),
                        key: *target,
                    },
                };
                self.rpc(&node.address, request)
            });
            let replies = join_all(calls).await;

            for (node, reply) in candidates.iter().zip(replies) {
                let nodes = match reply {
                    Ok(DhtResponse::Nodes { nodes, .. }) => nodes,
                    Ok(DhtResponse::Value { value, .. }) if mode == LookupMode::Value => {
                        if self.accept_found_value(target, &value) {
                            return LookupOutcome::Found(value);
                        }
                        debug!(node = ?node.node_id, "discarding invalid FIND_VALUE reply");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(_) => {
                        failed.insert(node.node_id);
                        continue;
                    }
                };
                for n in nodes {
                    if n.node_id != own_id && seen.insert(n.node_id) {
                        shortlist.push(n);
                    }
                }
            }

            shortlist.retain(|n| !failed.contains(&n.node_id));
            shortlist.sort_by(|a, b| cmp_distance(target, &a.node_id, &b.node_id));
            shortlist.truncate(k);

            if finishing {
                debug!(target = ?target, rounds = round, "lookup converged");
                break;
            }
            let Some(first) = shortlist.first() else {
                break;
            };
            let closest = target.distance(&first.node_id);
            if closest >= best {
                finishing = true;
            } else {
                best = closest;
            }
        }

        self.routing_table.mark_refreshed(target, self.now());

        if shortlist.is_empty() && !failed.is_empty() {
            return LookupOutcome::Exhausted;
        }
        LookupOutcome::Closest(shortlist)
    }

    /// A FIND_VALUE hit counts only if signed, bound to `key`, owned by its
    /// key holder and unexpired.
    fn accept_found_value(&self, key: &NodeId, value: &DhtValue) -> bool {
        value.verify()
            && value.matches_key(key)
            && value.owner_matches()
            && !value.is_expired(self.now())
    }
}
