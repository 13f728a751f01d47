//! # Shared Types Crate
//!
//! Types every Wavelink crate agrees on: peer identifiers, the signed
//! [`Envelope`] and its canonical form, the [`TimeSource`] port, the error
//! taxonomy, and the replay and token-bucket primitives.
//!
//! ## Design Principles
//!
//! - **Envelope Authority**: the envelope's `sender_id` is the sole source of
//!   identity, and it must hash-match the key that verifies the signature.
//! - **Injected Time**: nothing here reads the system clock directly.

pub mod canonical;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod message_type;
pub mod rate_limiter;
pub mod security;
pub mod time;

pub use canonical::{canonical_bytes, canonical_bytes_without};
pub use envelope::{Envelope, Payload};
pub use errors::*;
pub use ids::{PeerAddress, PeerId};
pub use message_type::{MessageClass, MessageType, MessageTypeParseError};
pub use rate_limiter::TokenBucket;
pub use security::{NonceCache, ReplayConfig};
pub use time::{SystemTimeSource, TimeSource, Timestamp};

#[cfg(any(test, feature = "test-utils"))]
pub use time::ManualTimeSource;

/// `#[serde(with = "shared_types::duration_secs")]` for `Duration` config
/// fields written as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as integer seconds.
    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    /// Deserialize from integer seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// `#[serde(with = "shared_types::duration_millis")]` for sub-second
/// config fields.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as integer milliseconds.
    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    /// Deserialize from integer milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
