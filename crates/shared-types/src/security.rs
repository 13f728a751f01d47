//! # Replay Guard
//!
//! Timestamp tolerance plus nonce uniqueness over a rolling window.
//!
//! ## Security Properties
//!
//! - **Time-Bounded Validity**: timestamps older than `max_age` or further
//!   ahead than `max_future_skew` are rejected before the cache is touched
//! - **Nonce Replay Prevention**: each nonce is accepted once while retained
//! - **Bounded memory**: nonces are dropped after `retention`, which is at
//!   least the full validity window, so an evicted nonce can never pass the
//!   timestamp check again

use crate::envelope::Envelope;
use crate::errors::{ProtocolError, ReplayKind};
use crate::time::Timestamp;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Replay guard parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Oldest acceptable timestamp relative to now.
    #[serde(with = "crate::duration_secs")]
    pub max_age: Duration,
    /// Furthest acceptable future timestamp relative to now.
    #[serde(with = "crate::duration_secs")]
    pub max_future_skew: Duration,
    /// How long a nonce is remembered.
    #[serde(with = "crate::duration_secs")]
    pub retention: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_age: Envelope::MAX_AGE,
            max_future_skew: Envelope::MAX_FUTURE_SKEW,
            retention: Envelope::NONCE_CACHE_TTL,
        }
    }
}

/// Concurrent nonce cache, sharded so inbound messages from unrelated
/// peers never contend on one lock.
#[derive(Debug, Default)]
pub struct NonceCache {
    /// nonce -> envelope timestamp (millis)
    seen: DashMap<Uuid, u64>,
    config: ReplayConfig,
}

impl NonceCache {
    /// Create with explicit parameters.
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            seen: DashMap::new(),
            config,
        }
    }

    /// Validate `timestamp` against `now`, then record `nonce`.
    ///
    /// # Errors
    ///
    /// `ReplayDetected` with the specific [`ReplayKind`].
    pub fn check_and_insert(
        &self,
        nonce: Uuid,
        timestamp: Timestamp,
        now: Timestamp,
    ) -> Result<(), ProtocolError> {
        // Timestamp check first: bounds everything after it.
        if timestamp < now.saturating_sub(self.config.max_age) {
            return Err(ProtocolError::ReplayDetected(ReplayKind::TimestampTooOld));
        }
        if timestamp > now.saturating_add(self.config.max_future_skew) {
            return Err(ProtocolError::ReplayDetected(
                ReplayKind::TimestampInFuture,
            ));
        }

        match self.seen.entry(nonce) {
            Entry::Occupied(_) => Err(ProtocolError::ReplayDetected(ReplayKind::NonceReused)),
            Entry::Vacant(slot) => {
                slot.insert(timestamp.as_millis());
                Ok(())
            }
        }
    }

    /// `true` if `nonce` is currently retained.
    pub fn contains(&self, nonce: &Uuid) -> bool {
        self.seen.contains_key(nonce)
    }

    /// Drop nonces whose timestamp is older than the retention window.
    /// Returns how many were removed.
    pub fn purge(&self, now: Timestamp) -> usize {
        let threshold = now.saturating_sub(self.config.retention).as_millis();
        let before = self.seen.len();
        self.seen.retain(|_, ts| *ts > threshold);
        before.saturating_sub(self.seen.len())
    }

    /// Number of cached nonces.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
