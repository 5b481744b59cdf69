//! Decoders for the raw blocks and transactions served by a Juno Cash full node.
//!
//! Parses the node's wire format, enforcing the Orchard-only transaction rules,
//! and projects the result into the compact formats sent to light wallets.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
