//! Hold error types for the transaction and block parsers.

/// Parser Error Type.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Input ended before the named field could be read in full.
    #[error("Truncated input: could not read {field}")]
    Truncated {
        /// The field being read.
        field: &'static str,
    },

    /// A compact size that is non-canonical or larger than allowed.
    #[error("Invalid compact size for {field}: {reason}")]
    InvalidCompactSize {
        /// The field whose length or count was being read.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// Invalid Data Error
    #[error("Invalid Data Error: {0}")]
    InvalidData(String),

    /// Hexadecimal decoding error.
    #[error("Hex Decode Error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Integer conversion error.
    #[error("Integer conversion error: {0}")]
    TryFromIntError(#[from] std::num::TryFromIntError),

    /// Field not found in reader
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Field not parsed yet
    #[error("Field not parsed: {0}")]
    FieldNotParsed(&'static str),

    /// Consensus validation error
    #[error("Consensus error: {0}")]
    ConsensusError(#[from] crate::chain::transaction::ConsensusError),
}
