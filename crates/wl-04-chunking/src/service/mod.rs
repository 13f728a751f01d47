//! # Service Layer
//!
//! [`ChunkManager`]: concurrent reassembly with tombstones and completion
//! waiters.

mod manager;

pub use manager::{ChunkManager, ChunkProgress};
