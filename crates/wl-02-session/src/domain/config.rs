//! Session and handshake parameters.

use serde::Deserialize;
use shared_types::{duration_millis, duration_secs};
use std::time::Duration;

/// Handshake, lifetime and replay-window settings.
///
/// # Security Notes
///
/// - `handshake_timeout`: a stalled handshake is expired and its ephemeral
///   key dropped.
/// - `challenge_ttl`: message 3 must answer the challenge within this time.
/// - `replay_window` / `forward_window`: sizes of the backward and forward
///   sequence windows; together they size the replay ring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Protocol versions this node speaks, any order (default: `[1]`)
    pub supported_versions: Vec<u16>,
    /// Capabilities offered during negotiation (default: none)
    pub capabilities: Vec<String>,
    /// Wall-clock budget for the whole handshake (default: 30 s)
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,
    /// Lifetime of the challenge in message 2 (default: 10 s)
    #[serde(with = "duration_secs")]
    pub challenge_ttl: Duration,
    /// How long a READY session lives (default: 24 h)
    #[serde(with = "duration_secs")]
    pub session_lifetime: Duration,
    /// Resend the last handshake message after this long (default: 1000 ms)
    #[serde(with = "duration_millis")]
    pub retransmit_interval: Duration,
    /// Give up resending after this many attempts (default: 5)
    pub max_retransmits: u32,
    /// Sequence numbers accepted behind the expected one (default: 64)
    pub replay_window: u64,
    /// Sequence numbers accepted ahead of the expected one (default: 64)
    pub forward_window: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            supported_versions: vec![1],
            capabilities: Vec::new(),
            handshake_timeout: Duration::from_secs(30),
            challenge_ttl: Duration::from_secs(10),
            session_lifetime: Duration::from_secs(24 * 3_600),
            retransmit_interval: Duration::from_millis(1_000),
            max_retransmits: 5,
            replay_window: 64,
            forward_window: 64,
        }
    }
}

impl SessionConfig {
    /// Short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            challenge_ttl: Duration::from_secs(2),
            session_lifetime: Duration::from_secs(600),
            retransmit_interval: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Builder-style capability list.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Highest version both sides speak.
    pub fn choose_version(&self, offered: &[u16]) -> Option<u16> {
        self.supported_versions
            .iter()
            .filter(|v| offered.contains(v))
            .max()
            .copied()
    }
}
