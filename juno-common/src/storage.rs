//! Storage configuration types shared across Juno services.

use std::path::PathBuf;

/// In-memory cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Expected number of blocks held in memory.
    ///
    /// Only a pre-allocation hint, the cache grows past it when needed.
    pub capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Some(10000),
        }
    }
}

/// Database configuration.
///
/// Configures the directory used for persistent block storage. Each network
/// gets its own subdirectory below `path`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    /// Database directory path.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./juno_cache"),
        }
    }
}

/// Storage configuration combining cache and database settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Default)]
pub struct StorageConfig {
    /// Cache configuration. Uses defaults if not specified in TOML.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}
