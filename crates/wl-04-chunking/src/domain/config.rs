//! Fragmentation parameters.

use serde::Deserialize;
use shared_types::duration_secs;
use std::time::Duration;

/// Split and reassembly settings.
///
/// # Security Notes
///
/// - `max_total_chunks` and `max_concurrent_transfers` bound what a single
///   sender can make us buffer.
/// - `tombstone_ttl` must outlast `assembly_timeout` so stragglers for a
///   finished transfer are recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Payloads longer than this are split, and chunks carry at most this
    /// many bytes (default: 8192)
    pub threshold: usize,
    /// Most chunks one transfer may declare (default: 4096)
    pub max_total_chunks: u32,
    /// Open transfers allowed per sender (default: 64)
    pub max_concurrent_transfers: usize,
    /// Incomplete transfers are dropped after this long (default: 60 s)
    #[serde(with = "duration_secs")]
    pub assembly_timeout: Duration,
    /// Finished transfer ids are remembered this long (default: 120 s)
    #[serde(with = "duration_secs")]
    pub tombstone_ttl: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            threshold: 8 * 1024,
            max_total_chunks: 4_096,
            max_concurrent_transfers: 64,
            assembly_timeout: Duration::from_secs(60),
            tombstone_ttl: Duration::from_secs(120),
        }
    }
}

impl ChunkConfig {
    /// Tiny chunks so tests fragment small payloads.
    pub fn for_testing() -> Self {
        Self {
            threshold: 16,
            max_total_chunks: 64,
            max_concurrent_transfers: 4,
            ..Self::default()
        }
    }

    /// `true` if a payload of `len` bytes must be split.
    pub fn needs_split(&self, len: usize) -> bool {
        len > self.threshold
    }
}
