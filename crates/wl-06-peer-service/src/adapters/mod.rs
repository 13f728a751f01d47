//! # Adapters
//!
//! - `address_book`: `AddressBook` backed by the DHT

pub mod address_book;

pub use address_book::DhtAddressBook;
