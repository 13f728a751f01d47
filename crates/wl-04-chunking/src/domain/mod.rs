//! # Domain Layer
//!
//! Chunk frames, splitting, and the per-transfer reassembly buffer.

pub mod assembly;
pub mod config;
pub mod errors;
pub mod frame;

pub use assembly::{ChunkAssembly, Reassembled};
pub use config::ChunkConfig;
pub use errors::ChunkError;
pub use frame::{split_payload, ChunkFrame};
