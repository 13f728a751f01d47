//! Admission parameters.

use serde::Deserialize;
use shared_types::{duration_millis, duration_secs, MessageClass};
use std::time::Duration;

/// Burst size and sustained rate for one message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClassLimit {
    /// Tokens in a full bucket
    pub capacity: u64,
    /// Tokens restored per second
    pub refill_per_sec: u64,
}

impl ClassLimit {
    /// Create a limit.
    pub const fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }
}

/// Rate limiter configuration.
///
/// # Security Notes
///
/// - Handshakes get the smallest budget: each one costs the responder an
///   X25519 exchange and a signature.
/// - A peer that keeps bursting is blocked for every class, so it cannot
///   move its flood from one class to another.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Handshake messages (default: 4 burst, 1/s)
    pub handshake: ClassLimit,
    /// Application data and extensions (default: 64, 32/s)
    pub data: ClassLimit,
    /// Fragments (default: 256, 128/s)
    pub chunk: ClassLimit,
    /// Heartbeats (default: 16, 8/s)
    pub heartbeat: ClassLimit,
    /// Gap-fill, rate-limit notices, teardown (default: 16, 4/s)
    pub control: ClassLimit,
    /// Violations are counted over this window (default: 60 s)
    #[serde(with = "duration_secs")]
    pub violation_window: Duration,
    /// Violations inside the window that trigger a block (default: 20)
    pub block_threshold: u32,
    /// Length of a block (default: 300 s)
    #[serde(with = "duration_secs")]
    pub block_duration: Duration,
    /// At most one `RateLimited` notice per peer per interval (default: 1000 ms)
    #[serde(with = "duration_millis")]
    pub notify_interval: Duration,
    /// Buckets untouched this long are dropped (default: 600 s)
    #[serde(with = "duration_secs")]
    pub idle_ttl: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            handshake: ClassLimit::new(4, 1),
            data: ClassLimit::new(64, 32),
            chunk: ClassLimit::new(256, 128),
            heartbeat: ClassLimit::new(16, 8),
            control: ClassLimit::new(16, 4),
            violation_window: Duration::from_secs(60),
            block_threshold: 20,
            block_duration: Duration::from_secs(300),
            notify_interval: Duration::from_millis(1_000),
            idle_ttl: Duration::from_secs(600),
        }
    }
}

impl AdmissionConfig {
    /// Generous limits so functional tests never trip the limiter.
    pub fn for_testing() -> Self {
        let wide = ClassLimit::new(10_000, 10_000);
        Self {
            handshake: wide,
            data: wide,
            chunk: wide,
            heartbeat: wide,
            control: wide,
            ..Self::default()
        }
    }

    /// Limit applied to `class`.
    pub fn limit(&self, class: MessageClass) -> ClassLimit {
        match class {
            MessageClass::Handshake => self.handshake,
            MessageClass::Data => self.data,
            MessageClass::Chunk => self.chunk,
            MessageClass::Heartbeat => self.heartbeat,
            MessageClass::Control => self.control,
        }
    }
}
