//! Domain Layer - engine configuration, results and control payloads

pub mod config;
pub mod messages;
pub mod retransmit;

pub use config::EngineConfig;
pub use messages::{
    DecodedMessage, DeliveryReceipt, GapFillRequest, Inbound, RateLimitedNotice, TeardownNotice,
};
pub use retransmit::{RetransmitRing, SentMessage};
