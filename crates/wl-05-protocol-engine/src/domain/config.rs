//! Engine configuration.

use serde::Deserialize;
use shared_types::{duration_secs, ReplayConfig};
use std::time::Duration;
use wl_02_session::SessionConfig;
use wl_03_admission::AdmissionConfig;
use wl_04_chunking::ChunkConfig;

/// Everything the engine and its parts are tuned by.
///
/// Each section deserializes on its own, so a TOML file may set only the
/// fields it cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Handshake, lifetime and replay-window settings
    pub session: SessionConfig,
    /// Rate limits
    pub admission: AdmissionConfig,
    /// Fragmentation
    pub chunking: ChunkConfig,
    /// Timestamp tolerance and nonce retention (defaults: 60 s / 10 s / 120 s)
    pub replay: ReplayConfig,
    /// How long `send` waits for a handshake to reach READY (default: 30 s)
    #[serde(with = "duration_secs")]
    pub send_timeout: Duration,
    /// Deadline for one frame handed to the transport (default: 5 s)
    #[serde(with = "duration_secs")]
    pub delivery_timeout: Duration,
    /// Session ids of failed or closed sessions are refused this long
    /// (default: 600 s)
    #[serde(with = "duration_secs")]
    pub tombstone_ttl: Duration,
    /// Outbound messages kept per session for gap-fill (default: 64)
    pub retransmit_ring: usize,
    /// Back-off applied when a peer says we are rate limited (default: 1 s)
    #[serde(with = "duration_secs")]
    pub rate_limited_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            admission: AdmissionConfig::default(),
            chunking: ChunkConfig::default(),
            replay: ReplayConfig::default(),
            send_timeout: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(5),
            tombstone_ttl: Duration::from_secs(600),
            retransmit_ring: 64,
            rate_limited_backoff: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Short timers and wide rate limits for tests.
    pub fn for_testing() -> Self {
        Self {
            session: SessionConfig::for_testing(),
            admission: AdmissionConfig::for_testing(),
            chunking: ChunkConfig::default(),
            send_timeout: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }
}
