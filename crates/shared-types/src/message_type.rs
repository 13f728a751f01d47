//! # Message Types
//!
//! A closed set of core kinds plus the versioned extension path
//! `ext:<name>`. The wire form is a plain string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Maximum length of an extension name.
pub const MAX_EXT_NAME_LEN: usize = 64;

/// Envelope `msg_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// 1: I -> R identity + ephemeral key + versions.
    HandshakeInit,
    /// 2: R -> I identity + ephemeral key + challenge.
    HandshakeAck,
    /// 3: I -> R challenge signature + capabilities.
    HandshakeChallengeResponse,
    /// 4: R -> I session id + confirmation.
    HandshakeSession,
    /// 5: I -> R final confirmation.
    HandshakeConfirm,
    /// 6: R -> I ready.
    HandshakeReady,
    /// Application payload.
    Data,
    /// One fragment of a larger payload.
    Chunk,
    /// Liveness probe.
    Heartbeat,
    /// Request to resend a sequence range.
    GapFill,
    /// Sender is being throttled.
    RateLimited,
    /// Session closed by the peer.
    Teardown,
    /// Extension type gated on a negotiated capability of the same name.
    Ext(String),
}

impl MessageType {
    /// Wire name.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        use std::borrow::Cow;
        match self {
            Self::HandshakeInit => Cow::Borrowed("HANDSHAKE_INIT"),
            Self::HandshakeAck => Cow::Borrowed("HANDSHAKE_ACK"),
            Self::HandshakeChallengeResponse => Cow::Borrowed("HANDSHAKE_CHALLENGE_RESPONSE"),
            Self::HandshakeSession => Cow::Borrowed("HANDSHAKE_SESSION"),
            Self::HandshakeConfirm => Cow::Borrowed("HANDSHAKE_CONFIRM"),
            Self::HandshakeReady => Cow::Borrowed("HANDSHAKE_READY"),
            Self::Data => Cow::Borrowed("DATA"),
            Self::Chunk => Cow::Borrowed("CHUNK"),
            Self::Heartbeat => Cow::Borrowed("HEARTBEAT"),
            Self::GapFill => Cow::Borrowed("GAP_FILL"),
            Self::RateLimited => Cow::Borrowed("RATE_LIMITED"),
            Self::Teardown => Cow::Borrowed("TEARDOWN"),
            Self::Ext(name) => Cow::Owned(format!("ext:{name}")),
        }
    }

    /// Build an extension type, validating the name.
    pub fn ext(name: &str) -> Result<Self, MessageTypeParseError> {
        if name.is_empty()
            || name.len() > MAX_EXT_NAME_LEN
            || !name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"-_.".contains(&b))
        {
            return Err(MessageTypeParseError(format!("ext:{name}")));
        }
        Ok(Self::Ext(name.to_string()))
    }

    /// Position in the six-message handshake, 1-based.
    pub fn handshake_step(&self) -> Option<u8> {
        match self {
            Self::HandshakeInit => Some(1),
            Self::HandshakeAck => Some(2),
            Self::HandshakeChallengeResponse => Some(3),
            Self::HandshakeSession => Some(4),
            Self::HandshakeConfirm => Some(5),
            Self::HandshakeReady => Some(6),
            _ => None,
        }
    }

    /// `true` for the six handshake kinds.
    pub fn is_handshake(&self) -> bool {
        self.handshake_step().is_some()
    }

    /// `true` for kinds that carry encrypted application data.
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Data | Self::Ext(_))
    }

    /// Capability a session must have negotiated to carry this type.
    pub fn required_capability(&self) -> Option<String> {
        match self {
            Self::Ext(name) => Some(format!("ext:{name}")),
            _ => None,
        }
    }

    /// Admission class charged for this type.
    pub fn class(&self) -> MessageClass {
        match self {
            t if t.is_handshake() => MessageClass::Handshake,
            Self::Data | Self::Ext(_) => MessageClass::Data,
            Self::Chunk => MessageClass::Chunk,
            Self::Heartbeat => MessageClass::Heartbeat,
            _ => MessageClass::Control,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Unknown or malformed `msg_type` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type: {0}")]
pub struct MessageTypeParseError(pub String);

impl FromStr for MessageType {
    type Err = MessageTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "HANDSHAKE_INIT" => Self::HandshakeInit,
            "HANDSHAKE_ACK" => Self::HandshakeAck,
            "HANDSHAKE_CHALLENGE_RESPONSE" => Self::HandshakeChallengeResponse,
            "HANDSHAKE_SESSION" => Self::HandshakeSession,
            "HANDSHAKE_CONFIRM" => Self::HandshakeConfirm,
            "HANDSHAKE_READY" => Self::HandshakeReady,
            "DATA" => Self::Data,
            "CHUNK" => Self::Chunk,
            "HEARTBEAT" => Self::Heartbeat,
            "GAP_FILL" => Self::GapFill,
            "RATE_LIMITED" => Self::RateLimited,
            "TEARDOWN" => Self::Teardown,
            other => match other.strip_prefix("ext:") {
                Some(name) => Self::ext(name)?,
                None => return Err(MessageTypeParseError(other.to_string())),
            },
        })
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Admission class: each has its own token bucket per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    /// Handshake messages 1 to 6.
    Handshake,
    /// Application data and extensions.
    Data,
    /// Fragments.
    Chunk,
    /// Heartbeats.
    Heartbeat,
    /// Gap-fill, rate-limit notices, teardown.
    Control,
}

impl MessageClass {
    /// All classes.
    pub const ALL: [MessageClass; 5] = [
        MessageClass::Handshake,
        MessageClass::Data,
        MessageClass::Chunk,
        MessageClass::Heartbeat,
        MessageClass::Control,
    ];
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Handshake => "handshake",
            Self::Data => "data",
            Self::Chunk => "chunk",
            Self::Heartbeat => "heartbeat",
            Self::Control => "control",
        };
        f.write_str(s)
    }
}
