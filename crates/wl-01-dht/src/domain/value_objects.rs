//! Configuration for the DHT.

use serde::Deserialize;
use shared_types::duration_secs;
use std::time::Duration;

/// Kademlia and value-store parameters.
///
/// # Security Notes
///
/// - `node_stale_after`: a full bucket only evicts its least-recently-seen
///   entry when that entry is stale. Fresh entries are challenged with a
///   PING instead, so a flood of new identities cannot flush stable peers.
/// - `max_value_ttl`: remote writers cannot pin values forever.
/// - `max_values`: bounds memory spent on remote STOREs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DhtConfig {
    /// Bucket size (default: 20)
    pub k: usize,
    /// Parallelism factor for lookups (default: 3)
    pub alpha: usize,
    /// Default value lifetime (default: 86400 s)
    #[serde(with = "duration_secs")]
    pub value_ttl: Duration,
    /// Upper bound accepted for a value's TTL (default: 7 days)
    #[serde(with = "duration_secs")]
    pub max_value_ttl: Duration,
    /// Refresh buckets idle longer than this (default: 3600 s)
    #[serde(with = "duration_secs")]
    pub refresh_interval: Duration,
    /// Re-store own values this often (default: 3600 s)
    #[serde(with = "duration_secs")]
    pub republish_interval: Duration,
    /// A node unheard-of for this long may be evicted (default: 900 s)
    #[serde(with = "duration_secs")]
    pub node_stale_after: Duration,
    /// Per-RPC deadline (default: 5 s)
    #[serde(with = "duration_secs")]
    pub rpc_timeout: Duration,
    /// How long an eviction challenge may stay unanswered (default: 5 s)
    #[serde(with = "duration_secs")]
    pub eviction_challenge_timeout: Duration,
    /// Hard cap on lookup rounds (default: 20)
    pub max_lookup_iterations: usize,
    /// Hard cap on stored values (default: 65536)
    pub max_values: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            k: 20,
            alpha: 3,
            value_ttl: Duration::from_secs(86_400),
            max_value_ttl: Duration::from_secs(7 * 86_400),
            refresh_interval: Duration::from_secs(3_600),
            republish_interval: Duration::from_secs(3_600),
            node_stale_after: Duration::from_secs(900),
            rpc_timeout: Duration::from_secs(5),
            eviction_challenge_timeout: Duration::from_secs(5),
            max_lookup_iterations: 20,
            max_values: 65_536,
        }
    }
}

impl DhtConfig {
    /// Create a config suitable for testing (smaller values)
    pub fn for_testing() -> Self {
        Self {
            k: 3, // Smaller buckets for easier testing
            alpha: 2,
            rpc_timeout: Duration::from_millis(200),
            eviction_challenge_timeout: Duration::from_secs(1),
            max_values: 64,
            ..Self::default()
        }
    }
}
