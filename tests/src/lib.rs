//! # Wavelink Test Suite
//!
//! Unified test crate for behaviour that spans several crates.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # In-memory meshes shared by the integration tests
//! └── integration/
//!     ├── bootstrap.rs  # Joining the DHT through a seed
//!     ├── handshake.rs  # Lossy handshake, then encrypted data
//!     ├── chunking.rs   # 20 KiB in three chunks, any order
//!     └── discovery.rs  # Discovery-driven messaging through PeerService
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p wl-tests
//! cargo test -p wl-tests integration::handshake
//!
//! # Benchmarks
//! cargo bench -p wl-tests
//! ```

pub mod integration;
pub mod support;
