//! # Wavelink Chunking
//!
//! Fragmentation for payloads larger than the chunk threshold.
//!
//! ## Wire Shape
//!
//! Each chunk carries `(transfer_id, index, total, checksum)` plus the
//! whole-payload checksum and the original message type. Chunks may arrive
//! in any order; the payload is released once every index is present and
//! the joined bytes match the payload checksum.
//!
//! ## Security
//!
//! - A chunk failing its BLAKE3 checksum aborts the whole transfer
//! - Headers that change mid-transfer abort it as well
//! - Per-sender transfer and per-transfer chunk limits bound buffering
//! - Finished transfer ids are tombstoned; late chunks are dropped

pub mod domain;
pub mod service;

pub use domain::{split_payload, ChunkAssembly, ChunkConfig, ChunkError, ChunkFrame, Reassembled};
pub use service::{ChunkManager, ChunkProgress};
