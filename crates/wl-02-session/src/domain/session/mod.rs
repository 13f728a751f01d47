//! # Session
//!
//! One peer relation in one direction: the handshake driver on either side,
//! then the keys, send counter and replay window of the established session.
//!
//! - `core`: state, encryption, sequence numbers, expiry, retransmission
//! - `initiator`: messages 1, 3 and 5; handling of 2, 4 and 6
//! - `responder`: messages 2, 4 and 6; handling of 1, 3 and 5
//!
//! ## Security
//!
//! - Any signature or challenge failure moves the session to `Error` for
//!   good and drops all key material.
//! - Keys exist only from message 3 on and are zeroized on teardown.

mod core;
mod initiator;
mod responder;

pub use core::{HandshakeStep, Session};

#[cfg(test)]
mod tests;
