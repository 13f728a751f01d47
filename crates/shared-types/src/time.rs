//! # Time
//!
//! Every time-dependent decision (replay tolerance, bucket refill, TTLs,
//! staleness) reads the clock through [`TimeSource`] so tests can drive it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unix time in milliseconds.
///
/// # Security
///
/// Values are clamped to `MAX_REASONABLE` so a peer-supplied `u64::MAX`
/// cannot corrupt eviction ordering or overflow arithmetic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Year 9999 in milliseconds.
    pub const MAX_REASONABLE: u64 = 253_402_300_799_000;

    /// Create a new timestamp, clamping to `MAX_REASONABLE`.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis.min(Self::MAX_REASONABLE))
    }

    /// Create from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::from_millis(secs.saturating_mul(1_000))
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds since the epoch.
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000
    }

    /// Add a duration (saturating at `MAX_REASONABLE`).
    pub fn saturating_add(&self, d: Duration) -> Self {
        Self::from_millis(self.0.saturating_add(d.as_millis() as u64))
    }

    /// Subtract a duration (saturating at 0).
    pub fn saturating_sub(&self, d: Duration) -> Self {
        Self(self.0.saturating_sub(d.as_millis() as u64))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Abstract clock.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Production time source using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    /// Create a new system time source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Timestamp::from_millis(duration.as_millis() as u64)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualTimeSource;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::{TimeSource, Timestamp};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualTimeSource {
        millis: AtomicU64,
    }

    impl ManualTimeSource {
        /// Start at `millis`.
        pub fn new(millis: u64) -> Self {
            Self {
                millis: AtomicU64::new(millis),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, d: Duration) {
            self.millis
                .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
        }

        /// Jump to an absolute instant.
        pub fn set(&self, millis: u64) {
            self.millis.store(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
        }
    }
}
