use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::DhtNode;

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Nodes evicted because their eviction challenge timed out.
    pub challenges_expired: usize,
    /// Expired values removed from the local store.
    pub values_purged: usize,
    /// Buckets refreshed by a random lookup.
    pub buckets_refreshed: usize,
    /// Values re-stored on the network.
    pub values_republished: usize,
}

impl DhtNode {
    /// Evict nodes whose eviction challenge went unanswered, replacing them
    /// with the waiting candidate.
    pub fn check_expired_challenges(&self) -> usize {
        let evicted = self.routing_table.check_expired_challenges(self.now());
        for id in &evicted {
            debug!(evicted = ?id, "eviction challenge timed out");
        }
        evicted.len()
    }

    /// Delete expired values from the local store.
    pub fn purge_expired(&self) -> usize {
        self.values.purge_expired(self.now())
    }

    /// Look up a random id in every non-empty bucket that has been idle
    /// for `refresh_interval`.
    pub async fn refresh_buckets(&self) -> usize {
        let stale = self.routing_table.buckets_needing_refresh(self.now());
        let own_id = self.local.node_id;

        let lookups = stale.iter().map(|&index| {
            let target = own_id.random_in_bucket(index);
            async move {
                let result = self.find_node(&target).await;
                // Marked even when the lookup fails.
                self.routing_table.mark_refreshed(&target, self.now());
                result
            }
        });
        let refreshed = join_all(lookups).await.len();
        if refreshed > 0 {
            debug!(buckets = refreshed, "refreshed idle buckets");
        }
        refreshed
    }

    /// Re-store every value registered through this node. Values signed by
    /// our identity get a fresh `last_seen` and signature first.
    pub async fn republish(&self) -> usize {
        *self.last_republish.lock() = self.now();

        let own_key = self.identity.public_key();
        let entries: Vec<_> = self
            .published
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut republished = 0;
        for (key, mut value) in entries {
            if value.public_key == own_key {
                value.last_seen = self.now();
                if let Err(e) = value.sign(&self.identity) {
                    warn!(key = ?key, error = %e, "failed to re-sign value");
                    continue;
                }
            } else if value.is_expired(self.now()) {
                self.published.remove(&key);
                continue;
            }

            match self.store(key, value).await {
                Ok(_) => republished += 1,
                Err(e) => debug!(key = ?key, error = %e, "republish failed"),
            }
        }
        republished
    }

    /// One full maintenance pass. Republish only runs once
    /// `republish_interval` has passed since the last one.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let challenges_expired = self.check_expired_challenges();
        let values_purged = self.purge_expired();
        let buckets_refreshed = self.refresh_buckets().await;

        let due = {
            let last = *self.last_republish.lock();
            self.now().since(last) >= self.config.republish_interval
        };
        let values_republished = if due { self.republish().await } else { 0 };

        MaintenanceReport {
            challenges_expired,
            values_purged,
            buckets_refreshed,
            values_republished,
        }
    }

    /// Run [`run_maintenance`](Self::run_maintenance) every `tick` until
    /// `shutdown` flips to `true`.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            info!(node = ?node.node_id(), "DHT maintenance loop started");
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = node.run_maintenance().await;
                        if report != MaintenanceReport::default() {
                            debug!(?report, "DHT maintenance pass");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(node = ?node.node_id(), "DHT maintenance loop stopped");
        })
    }
}
