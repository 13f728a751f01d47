//! # Wavelink Admission Control
//!
//! Decides whether an inbound (or outbound) message may proceed, before any
//! decryption or handler work is spent on it.
//!
//! ## Model
//!
//! - One token bucket per (peer, message class), each class with its own
//!   burst capacity and refill rate
//! - A rejected message counts as a violation; enough violations inside
//!   the window block the peer for every class
//! - Blocks lapse on their own, independent of bucket refill
//!
//! | Class | Burst | Refill/s |
//! |-------|-------|----------|
//! | handshake | 4 | 1 |
//! | data | 64 | 32 |
//! | chunk | 256 | 128 |
//! | heartbeat | 16 | 8 |
//! | control | 16 | 4 |
//!
//! ## Security
//!
//! Tokens are integer milli-tokens, so a burst is admitted exactly
//! `capacity` times and one full refill interval restores exactly that many.

pub mod domain;
pub mod service;

pub use domain::{AdmissionConfig, ClassLimit, PeerRecord};
pub use service::RateLimiter;
pub use shared_types::{AdmissionError, MessageClass};
