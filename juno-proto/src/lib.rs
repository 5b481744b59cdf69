//! Holds the compact block formats served by the Juno light-client backend.
//!
//! The message layout follows the lightwalletd `compact_formats.proto` so that
//! existing wallets can decode it unchanged.

#![forbid(unsafe_code)]

pub mod proto;
