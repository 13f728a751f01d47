//! # Wavelink Sessions
//!
//! The six-message authenticated handshake and the state of an established
//! session.
//!
//! ## Handshake
//!
//! ```text
//! Initiator                                   Responder
//!   | 1 HANDSHAKE_INIT   (id key, eph key, versions)  |
//!   |------------------------------------------------>|
//!   | 2 HANDSHAKE_ACK    (id key, eph key, challenge) |
//!   |<------------------------------------------------|
//!   | 3 CHALLENGE_RESPONSE (signed challenge + caps)  |
//!   |------------------------------------------------>|
//!   | 4 HANDSHAKE_SESSION (session id, confirmation)  |
//!   |<------------------------------------------------|
//!   | 5 HANDSHAKE_CONFIRM (confirmation)              |
//!   |------------------------------------------------>|
//!   | 6 HANDSHAKE_READY                               |
//!   |<------------------------------------------------|
//! ```
//!
//! Shared secret = X25519(ephemeral_I, ephemeral_R). Session keys come from
//! HKDF-SHA256 over it, salted with the BLAKE3 hash of messages 1 to 3.
//! Messages 4 and 5 prove with an HMAC that both sides hold the same keys.
//!
//! ## Security
//!
//! - Signature or challenge failure: terminal `Error`, keys dropped.
//! - Handshake deadline (30 s) and session lifetime (24 h): terminal
//!   `Expired`.
//! - Only `Ready` sessions encrypt or decrypt.

pub mod domain;

pub use domain::{
    transition, HandshakeFrame, HandshakeInit, HandshakeStep, ReplayWindow, Role, Session,
    SessionConfig, SessionEvent, SessionState, WindowVerdict,
};
