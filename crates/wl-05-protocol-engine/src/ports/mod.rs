//! # Ports
//!
//! - `inbound`: what drives the engine (`FrameHandler`) and what it calls
//!   back into (`MessageHandler`, `DeliveryHook`)
//! - `outbound`: what the engine needs from the outside (`Transport`,
//!   `AddressBook`)

pub mod inbound;
pub mod outbound;

pub use inbound::{DeliveryHook, FrameHandler, MessageHandler};
pub use outbound::{AddressBook, Transport};
pub use shared_types::TimeSource;
