//! Session states and the role-specific transition table.

use serde::{Deserialize, Serialize};
use shared_types::ProtocolError;
use std::fmt;

/// Which side of the handshake a session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sent message 1.
    Initiator,
    /// Received message 1.
    Responder,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initial,
    HandshakeInitSent,
    HandshakeAckReceived,
    ChallengeSent,
    SessionEstablished,
    SessionConfirmed,
    Ready,
    Error,
    Expired,
}

impl SessionState {
    /// `Error` and `Expired` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Expired)
    }

    /// Handshake started but not finished.
    pub fn is_handshaking(&self) -> bool {
        !self.is_terminal() && *self != Self::Ready
    }

    /// Ordering used to report the most advanced of several sessions.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Error | Self::Expired => 0,
            Self::Initial => 1,
            Self::HandshakeInitSent => 2,
            Self::HandshakeAckReceived => 3,
            Self::ChallengeSent => 4,
            Self::SessionEstablished => 5,
            Self::SessionConfirmed => 6,
            Self::Ready => 7,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::HandshakeInitSent => "HANDSHAKE_INIT_SENT",
            Self::HandshakeAckReceived => "HANDSHAKE_ACK_RECEIVED",
            Self::ChallengeSent => "CHALLENGE_SENT",
            Self::SessionEstablished => "SESSION_ESTABLISHED",
            Self::SessionConfirmed => "SESSION_CONFIRMED",
            Self::Ready => "READY",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that moves a session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Initiator sent message 1.
    SendInit,
    /// Initiator received message 2.
    RecvAck,
    /// Initiator sent message 3.
    SendChallengeResponse,
    /// Initiator received message 4.
    RecvSession,
    /// Initiator sent message 5.
    SendConfirm,
    /// Initiator received message 6.
    RecvReady,
    /// Responder received message 1 and answered with message 2.
    RecvInit,
    /// Responder received message 3 and answered with message 4.
    RecvChallengeResponse,
    /// Responder received message 5.
    RecvConfirm,
    /// Responder sent message 6.
    SendReady,
    /// A signature or challenge check failed.
    Failure,
    /// Handshake deadline or session lifetime passed.
    Timeout,
    /// Local or remote teardown.
    Close,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The transition table.
///
/// | Role | From | Event | To |
/// |------|------|-------|----|
/// | Initiator | Initial | SendInit | HandshakeInitSent |
/// | Initiator | HandshakeInitSent | RecvAck | HandshakeAckReceived |
/// | Initiator | HandshakeAckReceived | SendChallengeResponse | ChallengeSent |
/// | Initiator | ChallengeSent | RecvSession | SessionEstablished |
/// | Initiator | SessionEstablished | SendConfirm | SessionConfirmed |
/// | Initiator | SessionConfirmed | RecvReady | Ready |
/// | Responder | Initial | RecvInit | ChallengeSent |
/// | Responder | ChallengeSent | RecvChallengeResponse | SessionEstablished |
/// | Responder | SessionEstablished | RecvConfirm | SessionConfirmed |
/// | Responder | SessionConfirmed | SendReady | Ready |
/// | any | non-terminal | Failure | Error |
/// | any | non-terminal | Timeout, Close | Expired |
///
/// Anything else is `InvalidState`. Terminal states never change.
pub fn transition(
    role: Role,
    state: SessionState,
    event: SessionEvent,
) -> Result<SessionState, ProtocolError> {
    use Role::*;
    use SessionEvent::*;
    use SessionState::*;

    let next = match (role, state, event) {
        (_, s, _) if s.is_terminal() => None,
        (_, _, Failure) => Some(Error),
        (_, _, Timeout | Close) => Some(Expired),

        (Initiator, Initial, SendInit) => Some(HandshakeInitSent),
        (Initiator, HandshakeInitSent, RecvAck) => Some(HandshakeAckReceived),
        (Initiator, HandshakeAckReceived, SendChallengeResponse) => Some(ChallengeSent),
        (Initiator, ChallengeSent, RecvSession) => Some(SessionEstablished),
        (Initiator, SessionEstablished, SendConfirm) => Some(SessionConfirmed),
        (Initiator, SessionConfirmed, RecvReady) => Some(Ready),

        (Responder, Initial, RecvInit) => Some(ChallengeSent),
        (Responder, ChallengeSent, RecvChallengeResponse) => Some(SessionEstablished),
        (Responder, SessionEstablished, RecvConfirm) => Some(SessionConfirmed),
        (Responder, SessionConfirmed, SendReady) => Some(Ready),

        _ => None,
    };

    next.ok_or_else(|| ProtocolError::InvalidState {
        state: state.to_string(),
        event: event.to_string(),
    })
}
