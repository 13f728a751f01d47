//! Domain Layer - peer service configuration

pub mod config;

pub use config::PeerServiceConfig;
