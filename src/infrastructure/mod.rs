//! Concrete adapters behind the domain ports.

pub mod http;
pub mod in_memory;
pub mod key_lock;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
