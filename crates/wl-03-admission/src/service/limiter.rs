//! The rate limiter service.

use std::sync::Arc;

use dashmap::DashMap;
use shared_types::{AdmissionError, MessageClass, PeerId, TimeSource, Timestamp, TokenBucket};
use tracing::{debug, warn};

use crate::domain::{AdmissionConfig, PeerRecord};

/// Token buckets per (peer, class) plus per-peer blocking.
///
/// # Concurrency
///
/// Buckets and peer records live in separate sharded maps; a check locks
/// one bucket shard and then, only on rejection, one record shard.
pub struct RateLimiter {
    buckets: DashMap<(PeerId, MessageClass), TokenBucket>,
    peers: DashMap<PeerId, PeerRecord>,
    config: AdmissionConfig,
    time_source: Arc<dyn TimeSource>,
}

impl RateLimiter {
    /// Create a limiter reading time from `time_source`.
    pub fn new(config: AdmissionConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            buckets: DashMap::new(),
            peers: DashMap::new(),
            config,
            time_source,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// `true` if one message of `class` from `peer` may proceed now.
    pub fn admit(&self, peer: &PeerId, class: MessageClass) -> bool {
        self.check(peer, class).is_ok()
    }

    /// Charge one token of `class` to `peer`.
    ///
    /// # Errors
    ///
    /// - `Blocked` while the peer serves a block, whatever the class
    /// - `RateLimited` when the class bucket is empty
    pub fn check(&self, peer: &PeerId, class: MessageClass) -> Result<(), AdmissionError> {
        self.check_at(peer, class, self.time_source.now())
    }

    /// [`check`](Self::check) at an explicit instant.
    pub fn check_at(
        &self,
        peer: &PeerId,
        class: MessageClass,
        now: Timestamp,
    ) -> Result<(), AdmissionError> {
        if let Some(until) = self.blocked_until_at(peer, now) {
            return Err(AdmissionError::Blocked { until });
        }

        let admitted = {
            let limit = self.config.limit(class);
            let mut bucket = self
                .buckets
                .entry((*peer, class))
                .or_insert_with(|| TokenBucket::new(limit.capacity, limit.refill_per_sec, now));
            bucket.try_acquire(now)
        };
        if admitted {
            return Ok(());
        }

        let blocked = self.peers.entry(*peer).or_default().record_violation(
            now,
            self.config.violation_window,
            self.config.block_threshold,
            self.config.block_duration,
        );
        match blocked {
            Some(until) => {
                warn!(
                    peer = ?peer,
                    %class,
                    until = until.as_millis(),
                    "peer blocked for repeated bursting"
                );
                Err(AdmissionError::Blocked { until })
            }
            None => {
                debug!(peer = ?peer, %class, "rate limited");
                Err(AdmissionError::RateLimited { class })
            }
        }
    }

    /// End of the block `peer` is serving, if any.
    pub fn blocked_until(&self, peer: &PeerId) -> Option<Timestamp> {
        self.blocked_until_at(peer, self.time_source.now())
    }

    fn blocked_until_at(&self, peer: &PeerId, now: Timestamp) -> Option<Timestamp> {
        self.peers.get(peer).and_then(|r| r.blocked_until(now))
    }

    /// `true` if a `RateLimited` notice to `peer` is due; at most one per
    /// notify interval.
    pub fn should_notify(&self, peer: &PeerId) -> bool {
        let now = self.time_source.now();
        self.peers
            .entry(*peer)
            .or_default()
            .try_notify(now, self.config.notify_interval)
    }

    /// Whole tokens left for `peer` in `class`; a fresh bucket reports its
    /// capacity.
    pub fn available(&self, peer: &PeerId, class: MessageClass) -> u64 {
        let now = self.time_source.now();
        match self.buckets.get_mut(&(*peer, class)) {
            Some(mut bucket) => bucket.available(now),
            None => self.config.limit(class).capacity,
        }
    }

    /// Drop buckets idle for `idle_ttl` and peer records with nothing
    /// pending. Returns how many buckets were removed.
    pub fn purge_idle(&self, now: Timestamp) -> usize {
        let before = self.buckets.len();
        let idle_ttl = self.config.idle_ttl;
        self.buckets
            .retain(|_, bucket| now.since(bucket.last_refill()) < idle_ttl);
        self.peers.retain(|_, record| {
            !record.is_idle(now, self.config.violation_window, self.config.notify_interval)
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("buckets", &self.buckets.len())
            .field("peers", &self.peers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
