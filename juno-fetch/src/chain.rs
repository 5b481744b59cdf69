//! Types and parsers for raw Juno Cash blocks and transactions.

pub mod block;
pub mod error;
pub mod transaction;
pub mod utils;

#[cfg(test)]
pub(crate) mod tests;
