//! # Domain Layer
//!
//! Admission parameters and per-peer violation state. The token bucket
//! itself lives in `shared-types`.

pub mod config;
pub mod peer_record;

pub use config::{AdmissionConfig, ClassLimit};
pub use peer_record::PeerRecord;
