//! Holds config data for the Juno block cache.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use juno_common::{Network, StorageConfig};
use tracing::{error, info};

use crate::error::BlockCacheError;

/// Holds config data for [`crate::BlockCache`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BlockCacheConfig {
    /// Storage configuration (cache and database)
    pub storage: StorageConfig,
    /// Network type, selects the per-chain subdirectory.
    pub network: Network,
    /// Height of the first block the cache holds.
    pub start_height: u64,
    /// Discards persisted blocks at and above this height on open.
    ///
    /// Heights below `start_height` discard everything.
    pub sync_from_height: Option<u64>,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            network: Network::default(),
            start_height: 0,
            sync_from_height: None,
        }
    }
}

impl BlockCacheConfig {
    /// Returns a new instance of [`BlockCacheConfig`].
    pub fn new(
        storage: StorageConfig,
        network: Network,
        start_height: u64,
        sync_from_height: Option<u64>,
    ) -> Self {
        BlockCacheConfig {
            storage,
            network,
            start_height,
            sync_from_height,
        }
    }

    /// Directory holding this network's cache files.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .database
            .path
            .join(self.network.chain_tag())
    }

    /// Performs checks on config data.
    pub fn check_config(&self) -> Result<(), BlockCacheError> {
        if self.storage.database.path.as_os_str().is_empty() {
            return Err(BlockCacheError::ConfigError(
                "database path must not be empty".to_string(),
            ));
        }
        if self.start_height > u64::from(u32::MAX) {
            return Err(BlockCacheError::ConfigError(format!(
                "start height {} does not fit in a block height",
                self.start_height
            )));
        }
        Ok(())
    }
}

/// Attempts to load config data from a TOML file at the specified path.
///
/// Configuration sources are layered: Env > TOML > Defaults. Environment
/// variables use the `JUNO_` prefix, with `__` between nested keys, e.g.
/// `JUNO_STORAGE__DATABASE__PATH`.
pub fn load_config(file_path: &Path) -> Result<BlockCacheConfig, BlockCacheError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(BlockCacheConfig::default()))
        .merge(Toml::file(file_path))
        .merge(Env::prefixed("JUNO_").split("__"));

    match figment.extract::<BlockCacheConfig>() {
        Ok(parsed_config) => {
            parsed_config.check_config()?;
            info!(
                "Successfully loaded block cache config. Base TOML file checked: '{}'",
                file_path.display()
            );
            Ok(parsed_config)
        }
        Err(figment_error) => {
            error!(
                "Failed to extract configuration using figment: {}",
                figment_error
            );
            Err(BlockCacheError::ConfigError(format!(
                "Block cache configuration loading failed for '{}' (could be TOML file or environment variables). Details: {}",
                file_path.display(),
                figment_error
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_when_file_is_missing() {
        Jail::expect_with(|jail| {
            let config = load_config(&jail.directory().join("missing.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, BlockCacheConfig::default());
            assert_eq!(
                config.db_path(),
                PathBuf::from("./juno_cache").join("testnet")
            );
            Ok(())
        });
    }

    #[test]
    fn toml_values_are_loaded() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cache.toml",
                r#"
                network = "mainnet"
                start_height = 1000
                sync_from_height = 1500

                [storage.database]
                path = "/var/lib/juno"

                [storage.cache]
                capacity = 64
                "#,
            )?;
            let config =
                load_config(&jail.directory().join("cache.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.network, Network::Mainnet);
            assert_eq!(config.start_height, 1000);
            assert_eq!(config.sync_from_height, Some(1500));
            assert_eq!(config.storage.cache.capacity, Some(64));
            assert_eq!(config.db_path(), PathBuf::from("/var/lib/juno/mainnet"));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cache.toml",
                r#"
                network = "mainnet"
                start_height = 1000
                "#,
            )?;
            jail.set_env("JUNO_NETWORK", "regtest");
            jail.set_env("JUNO_STORAGE__DATABASE__PATH", "/tmp/juno-env");
            let config =
                load_config(&jail.directory().join("cache.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.network, Network::Regtest);
            assert_eq!(config.start_height, 1000);
            assert_eq!(config.db_path(), PathBuf::from("/tmp/juno-env/regtest"));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", r#"network = "moonnet""#)?;
            assert!(matches!(
                load_config(&jail.directory().join("bad.toml")),
                Err(BlockCacheError::ConfigError(_))
            ));

            jail.create_file("empty_path.toml", "[storage.database]\npath = \"\"\n")?;
            assert!(matches!(
                load_config(&jail.directory().join("empty_path.toml")),
                Err(BlockCacheError::ConfigError(_))
            ));
            Ok(())
        });
    }
}
