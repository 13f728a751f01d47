//! # Adapters
//!
//! Feature-gated implementations of the DHT ports.
//!
//! - `memory` (feature `memory-transport`): in-process network

#[cfg(any(test, feature = "memory-transport"))]
pub mod memory;

#[cfg(any(test, feature = "memory-transport"))]
pub use memory::InMemoryDhtNetwork;
