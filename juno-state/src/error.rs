//! Holds error types for Juno-state.

/// Errors related to the [`crate::BlockCache`].
#[derive(Debug, thiserror::Error)]
pub enum BlockCacheError {
    /// The height is outside the range a block can be added at.
    #[error("height {height} out of range, blocks can be added at {first}..={next}")]
    HeightOutOfRange {
        /// Requested height.
        height: u64,
        /// First height held by the cache.
        first: u64,
        /// Next height to be appended.
        next: u64,
    },

    /// The block does not carry the height it is being added at.
    #[error("block height {actual} does not match requested height {expected}")]
    WrongHeight {
        /// Requested height.
        expected: u64,
        /// Height found in the block.
        actual: u64,
    },

    /// The block does not build on the block held below it.
    #[error("block at height {height} does not extend the cached chain")]
    ChainMismatch {
        /// Height of the rejected block.
        height: u64,
    },

    /// The block is not fit for storage.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// On-disk state could not be kept consistent.
    #[error("cache corruption at height {height}: {reason}")]
    Corruption {
        /// Height being written or verified.
        height: u64,
        /// What went wrong.
        reason: String,
    },

    /// std::io::Error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Chain parse error.
    #[error("Chain parse error: {0}")]
    ChainParseError(#[from] juno_fetch::chain::error::ParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Integer conversion error.
    #[error("Integer conversion error: {0}")]
    TryFromIntError(#[from] std::num::TryFromIntError),
}
