//! Network type for Juno configuration.

/// Network type for Juno configuration.
///
/// Each network keeps its cached blocks in its own directory, named by
/// [`Network::chain_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Mainnet network
    Mainnet,
    /// Testnet network
    #[default]
    Testnet,
    /// Regtest network (for local testing)
    Regtest,
}

impl Network {
    /// Returns the tag used to separate per-chain storage.
    pub fn chain_tag(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.chain_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_tags_are_distinct() {
        let tags = [
            Network::Mainnet.chain_tag(),
            Network::Testnet.chain_tag(),
            Network::Regtest.chain_tag(),
        ];
        assert_eq!(tags, ["mainnet", "testnet", "regtest"]);
        assert_eq!(Network::default(), Network::Testnet);
    }
}
