//! Protobuf message definitions.

pub mod compact_formats;
