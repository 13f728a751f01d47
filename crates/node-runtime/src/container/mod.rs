//! # Node Container
//!
//! Configuration and the set of peer services the runtime hosts.
//!
//! - All peers share one in-memory frame network and one in-memory DHT
//!   network
//! - The first peer is the bootstrap seed for the others

pub mod config;
pub mod mesh;

pub use config::{ConfigError, LoggingConfig, NodeConfig, SimulationConfig};
pub use mesh::{SimulatedMesh, WorkloadReport};
