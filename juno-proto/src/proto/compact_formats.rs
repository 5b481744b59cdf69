//! Compact block and transaction records sent to light wallets.
//!
//! Juno Cash only carries Orchard shielded data, so the Sapling fields are
//! always left empty. They stay in the schema so the tags line up with
//! lightwalletd clients.

/// Information about the state of the chain as of a given block.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChainMetadata {
    /// The size of the Sapling note commitment tree as of the end of this block (always 0).
    #[prost(uint32, tag = "1")]
    pub sapling_commitment_tree_size: u32,
    /// The size of the Orchard note commitment tree as of the end of this block.
    #[prost(uint32, tag = "2")]
    pub orchard_commitment_tree_size: u32,
}

/// A packaging of ONLY the data from a block that a wallet needs to detect
/// payments to and spends from its Orchard notes.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactBlock {
    /// The version of this wire format, for storage.
    #[prost(uint32, tag = "1")]
    pub proto_version: u32,
    /// The height of this block.
    #[prost(uint64, tag = "2")]
    pub height: u64,
    /// The ID (hash) of this block, in wire (little-endian) order.
    #[prost(bytes = "vec", tag = "3")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    /// The ID (hash) of this block's predecessor, in wire order.
    #[prost(bytes = "vec", tag = "4")]
    pub prev_hash: ::prost::alloc::vec::Vec<u8>,
    /// Unix epoch time when the block was mined.
    #[prost(uint32, tag = "5")]
    pub time: u32,
    /// Full header; left empty, (hash, prev_hash, time) are sent instead.
    #[prost(bytes = "vec", tag = "6")]
    pub header: ::prost::alloc::vec::Vec<u8>,
    /// Zero or more compact transactions from this block.
    #[prost(message, repeated, tag = "7")]
    pub vtx: ::prost::alloc::vec::Vec<CompactTx>,
    /// Information about the state of the chain as of this block.
    #[prost(message, optional, tag = "8")]
    pub chain_metadata: ::core::option::Option<ChainMetadata>,
}

/// The minimum information for a wallet to know if a transaction is relevant
/// to it. Transparent-only transactions are never encoded.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactTx {
    /// The index within the full block.
    #[prost(uint64, tag = "1")]
    pub index: u64,
    /// The ID (hash) of this transaction, in wire order.
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    /// The transaction fee. Not computable without prior outputs, always 0.
    #[prost(uint32, tag = "3")]
    pub fee: u32,
    #[prost(message, repeated, tag = "4")]
    pub spends: ::prost::alloc::vec::Vec<CompactSaplingSpend>,
    #[prost(message, repeated, tag = "5")]
    pub outputs: ::prost::alloc::vec::Vec<CompactSaplingOutput>,
    #[prost(message, repeated, tag = "6")]
    pub actions: ::prost::alloc::vec::Vec<CompactOrchardAction>,
}

/// Sapling spend nullifier. Never populated on Juno Cash.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactSaplingSpend {
    #[prost(bytes = "vec", tag = "1")]
    pub nf: ::prost::alloc::vec::Vec<u8>,
}

/// Sapling output (cmu, epk, 52-byte ciphertext prefix). Never populated on Juno Cash.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactSaplingOutput {
    #[prost(bytes = "vec", tag = "1")]
    pub cmu: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub ephemeral_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext: ::prost::alloc::vec::Vec<u8>,
}

/// The fields of an Orchard action a wallet needs for trial decryption.
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompactOrchardAction {
    /// \[32\] The nullifier of the input note.
    #[prost(bytes = "vec", tag = "1")]
    pub nullifier: ::prost::alloc::vec::Vec<u8>,
    /// \[32\] The x-coordinate of the note commitment for the output note.
    #[prost(bytes = "vec", tag = "2")]
    pub cmx: ::prost::alloc::vec::Vec<u8>,
    /// \[32\] An encoding of an ephemeral Pallas public key.
    #[prost(bytes = "vec", tag = "3")]
    pub ephemeral_key: ::prost::alloc::vec::Vec<u8>,
    /// \[52\] The first 52 bytes of the encCiphertext field.
    #[prost(bytes = "vec", tag = "4")]
    pub ciphertext: ::prost::alloc::vec::Vec<u8>,
}
