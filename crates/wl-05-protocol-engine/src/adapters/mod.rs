//! # Adapters
//!
//! - `address_book`: fixed peer-to-address table
//! - `memory` (feature `memory-transport`): in-process network

pub mod address_book;

#[cfg(any(test, feature = "memory-transport"))]
pub mod memory;

pub use address_book::StaticAddressBook;

#[cfg(any(test, feature = "memory-transport"))]
pub use memory::InMemoryNetwork;
