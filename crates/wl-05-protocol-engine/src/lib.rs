//! # Wavelink Session Protocol Engine
//!
//! Drives sessions between peers: establishes them on demand, seals and
//! sends application messages, and runs every inbound frame through a
//! fixed validation pipeline.
//!
//! ## Architecture
//!
//! - **Domain Layer:** configuration, receive outcomes, control payloads,
//!   the per-session retransmit ring
//! - **Ports Layer:** `FrameHandler`, `MessageHandler`, `DeliveryHook`
//!   (inbound); `Transport`, `AddressBook` (outbound)
//! - **Service Layer:** `SessionProtocolEngine`
//! - **Adapters Layer:** `StaticAddressBook`, in-memory network (feature
//!   `memory-transport`)
//!
//! ## Inbound Pipeline
//!
//! | Step | Check | Failure |
//! |------|-------|---------|
//! | 1 | version | `InvalidVersion` |
//! | 2 | signature | `InvalidSignature` |
//! | 3 | timestamp and nonce | `ReplayDetected` |
//! | 4 | session and sequence | `SessionNotFound`, `SequenceError`, `ReplayDetected` |
//! | 5 | rate limit | `RateLimited`, `Blocked` |
//! | 6 | decryption | `DecryptionFailed` |
//! | 7 | reassembly | `ChunkRejected` |
//! | 8 | dispatch | none |
//!
//! ## Security
//!
//! - Nothing reaches a handler unless it was signed by the session peer,
//!   fresh, in-window and authenticated by the session key.
//! - A session id that failed or closed is never accepted again.
//! - Rate-limit notices are themselves sealed and sent at most once per
//!   notify interval.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::StaticAddressBook;
pub use domain::{
    DecodedMessage, DeliveryReceipt, EngineConfig, GapFillRequest, Inbound, RateLimitedNotice,
    RetransmitRing, SentMessage, TeardownNotice,
};
pub use ports::{AddressBook, DeliveryHook, FrameHandler, MessageHandler, Transport};
pub use service::{EngineMaintenanceReport, SessionProtocolEngine};
pub use shared_types::{ReceiveError, SendError};
pub use wl_02_session::{Role, SessionState};

#[cfg(any(test, feature = "memory-transport"))]
pub use adapters::InMemoryNetwork;
