//! Common types and configurations shared across Juno crates.
//!
//! This crate provides the network selector and the storage configuration
//! used by the block cache.

pub mod network;
pub mod storage;

pub use network::Network;
pub use storage::{CacheConfig, DatabaseConfig, StorageConfig};
