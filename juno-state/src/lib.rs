//! Juno's persistent compact block cache.
//!
//! Holds a contiguous run of compact blocks, mirrored to disk, that can be
//! rolled back on reorg:
//! - [`BlockCache`]: the cache itself.
//! - [`BlockCacheConfig`] / [`load_config`]: layered configuration.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub(crate) mod config;

pub use config::{load_config, BlockCacheConfig};

pub(crate) mod encoding;

pub(crate) mod error;

pub use error::BlockCacheError;

pub(crate) mod local_cache;

pub use local_cache::{BlockCache, BLOCKS_FILE_NAME, CORRUPTED_SUFFIX, INDEX_FILE_NAME};
