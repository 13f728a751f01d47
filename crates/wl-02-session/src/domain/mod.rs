//! Domain Layer - handshake and session state with no I/O
//!
//! - Role-specific state machine (`transition`)
//! - Handshake message payloads and signature bindings
//! - Replay window over sequence numbers
//! - `Session`: the handshake driver and the established session

pub mod config;
pub mod handshake;
pub mod replay_window;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use handshake::{
    HandshakeAck, HandshakeChallengeResponse, HandshakeConfirm, HandshakeFrame, HandshakeInit,
    HandshakeReady, HandshakeSession, SessionParams,
};
pub use replay_window::{ReplayWindow, WindowVerdict};
pub use session::{HandshakeStep, Session};
pub use state::{transition, Role, SessionEvent, SessionState};
