//! # Wavelink Peer Service
//!
//! Binds discovery to the session protocol engine: peers are addressed by
//! id, resolved through the DHT, and reached over authenticated sessions.
//!
//! ## Architecture
//!
//! - **Domain Layer:** `PeerServiceConfig`
//! - **Adapters Layer:** `DhtAddressBook`, the engine's `AddressBook`
//!   backed by signed DHT registrations
//! - **Service Layer:** `PeerService` and the `ServiceHandle` of its
//!   background loops
//!
//! ## Registration Keys
//!
//! An entity is stored under `hash(entity_id || hash("*"))` and once per
//! capability under `hash(entity_id || hash(capability))`, so it can be
//! found by id alone or by id and capability.

pub mod adapters;
pub mod domain;
pub mod service;

pub use adapters::DhtAddressBook;
pub use domain::PeerServiceConfig;
pub use service::{PeerService, ServiceHandle};
