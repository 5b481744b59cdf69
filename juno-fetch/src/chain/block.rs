//! Block fetching and deserialization functionality.

use crate::chain::{
    error::ParseError,
    transaction::FullTransaction,
    utils::{
        advance_to, capped_capacity, read_bytes_32, read_compact_length_prefixed, read_u32,
        read_zcash_script_i64, remaining_slice, CompactSize, ParseFromSlice,
    },
};
use juno_proto::proto::compact_formats::{ChainMetadata, CompactBlock};
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Version of the compact block wire format produced here.
pub const COMPACT_BLOCK_PROTO_VERSION: u32 = 1;

/// Script number found in the genesis coinbase in place of a height.
pub const GENESIS_COINBASE_MARKER: i64 = 0x1F07FFFF;

/// Smallest possible encoded transaction (v5 with every list empty).
const MIN_TX_LEN: usize = 4 + 4 + 4 + 4 + 4 + 1 + 1 + 1 + 1 + 1;

/// A block header, as described in protocol specification section 7.6.
#[derive(Debug, Clone)]
struct BlockHeaderData {
    /// The block version number indicates which set of block validation rules
    /// to follow.
    ///
    /// Size\[bytes\]: 4
    version: i32,
    /// The hash of the previous block, in wire order.
    ///
    /// Size\[bytes\]: 32
    hash_prev_block: [u8; 32],
    /// The root of the transaction merkle tree.
    ///
    /// Size\[bytes\]: 32
    hash_merkle_root: [u8; 32],
    /// Commitment to chain history and authorizing data.
    ///
    /// Size\[bytes\]: 32
    hash_block_commitments: [u8; 32],
    /// The block timestamp, in seconds since the Unix epoch.
    ///
    /// Size\[bytes\]: 4
    time: u32,
    /// An encoded version of the target threshold.
    ///
    /// Size\[bytes\]: 4
    n_bits_bytes: [u8; 4],
    /// An arbitrary field that miners can change to modify the header hash.
    ///
    /// Size\[bytes\]: 32
    nonce: [u8; 32],
    /// The Equihash solution.
    ///
    /// Size\[bytes\]: CompactSize
    solution: Vec<u8>,
}

impl ParseFromSlice for BlockHeaderData {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if txid.is_some() {
            return Err(ParseError::InvalidData(
                "txid must be None for BlockHeaderData::parse_from_slice".to_string(),
            ));
        }
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for BlockHeaderData::parse_from_slice".to_string(),
            ));
        }
        let mut cursor = Cursor::new(data);

        let version = read_u32(&mut cursor, "BlockHeaderData::version")? as i32;
        let hash_prev_block = read_bytes_32(&mut cursor, "BlockHeaderData::hash_prev_block")?;
        let hash_merkle_root = read_bytes_32(&mut cursor, "BlockHeaderData::hash_merkle_root")?;
        let hash_block_commitments =
            read_bytes_32(&mut cursor, "BlockHeaderData::hash_block_commitments")?;
        let time = read_u32(&mut cursor, "BlockHeaderData::time")?;
        let n_bits_bytes = read_u32(&mut cursor, "BlockHeaderData::n_bits_bytes")?.to_le_bytes();
        let nonce = read_bytes_32(&mut cursor, "BlockHeaderData::nonce")?;
        let solution = read_compact_length_prefixed(&mut cursor, "BlockHeaderData::solution")?;

        Ok((
            remaining_slice(&cursor),
            BlockHeaderData {
                version,
                hash_prev_block,
                hash_merkle_root,
                hash_block_commitments,
                time,
                n_bits_bytes,
                nonce,
                solution,
            },
        ))
    }
}

/// Complete block header.
#[derive(Debug, Clone)]
pub struct FullBlockHeader {
    /// Block header data.
    raw_block_header: BlockHeaderData,

    /// Serialized header bytes, as hashed.
    raw_bytes: Vec<u8>,

    /// Double SHA-256 of the serialized header, in wire order.
    cached_hash: [u8; 32],
}

impl ParseFromSlice for FullBlockHeader {
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        let (remaining_data, raw_block_header) =
            BlockHeaderData::parse_from_slice(data, txid, tx_version)?;
        let raw_bytes = data[..data.len() - remaining_data.len()].to_vec();
        let cached_hash: [u8; 32] = Sha256::digest(Sha256::digest(&raw_bytes)).into();

        Ok((
            remaining_data,
            FullBlockHeader {
                raw_block_header,
                raw_bytes,
                cached_hash,
            },
        ))
    }
}

impl FullBlockHeader {
    /// Returns the block version.
    pub fn version(&self) -> i32 {
        self.raw_block_header.version
    }

    /// Returns the hash of the previous block, in wire order.
    pub fn hash_prev_block(&self) -> [u8; 32] {
        self.raw_block_header.hash_prev_block
    }

    /// Returns the merkle root.
    pub fn hash_merkle_root(&self) -> [u8; 32] {
        self.raw_block_header.hash_merkle_root
    }

    /// Returns the block commitments hash.
    pub fn hash_block_commitments(&self) -> [u8; 32] {
        self.raw_block_header.hash_block_commitments
    }

    /// Returns the block time.
    pub fn time(&self) -> u32 {
        self.raw_block_header.time
    }

    /// Returns the encoded difficulty target.
    pub fn n_bits_bytes(&self) -> [u8; 4] {
        self.raw_block_header.n_bits_bytes
    }

    /// Returns the nonce.
    pub fn nonce(&self) -> [u8; 32] {
        self.raw_block_header.nonce
    }

    /// Returns the Equihash solution.
    pub fn solution(&self) -> &[u8] {
        &self.raw_block_header.solution
    }

    /// Returns the serialized header.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Returns the block hash, in wire order.
    pub fn cached_hash(&self) -> [u8; 32] {
        self.cached_hash
    }
}

/// A fully parsed Juno Cash block.
#[derive(Debug, Clone)]
pub struct FullBlock {
    /// The block header.
    hdr: FullBlockHeader,

    /// The block transactions, in block order.
    vtx: Vec<FullTransaction>,

    /// Block height, taken from the coinbase script.
    height: u64,
}

impl ParseFromSlice for FullBlock {
    /// `txid` holds one wire order txid per transaction when given.
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError> {
        if tx_version.is_some() {
            return Err(ParseError::InvalidData(
                "tx_version must be None for FullBlock::parse_from_slice".to_string(),
            ));
        }
        let mut cursor = Cursor::new(data);

        let (remaining_data, block_header_data) =
            FullBlockHeader::parse_from_slice(data, None, None)?;
        advance_to(&mut cursor, remaining_data);

        let tx_count = CompactSize::read(&mut cursor, "FullBlock::tx_count")?;
        let mut txids = match txid {
            Some(txids) if txids.len() as u64 != tx_count => {
                return Err(ParseError::InvalidData(format!(
                    "number of txids ({}) does not match the number of transactions in the block ({tx_count})",
                    txids.len()
                )));
            }
            Some(txids) => Some(txids.into_iter()),
            None => None,
        };

        let mut transactions =
            Vec::with_capacity(capped_capacity(&cursor, tx_count, MIN_TX_LEN)?);
        for _ in 0..tx_count {
            let txid = txids.as_mut().and_then(Iterator::next);
            let (remaining_data, tx) = FullTransaction::parse_from_slice(
                remaining_slice(&cursor),
                txid.map(|txid| vec![txid]),
                None,
            )?;
            transactions.push(tx);
            advance_to(&mut cursor, remaining_data);
        }

        let height = Self::get_block_height(&transactions)?;

        Ok((
            remaining_slice(&cursor),
            FullBlock {
                hdr: block_header_data,
                vtx: transactions,
                height,
            },
        ))
    }
}

impl FullBlock {
    /// Returns the full block header.
    pub fn header(&self) -> &FullBlockHeader {
        &self.hdr
    }

    /// Returns the transactions held in the block.
    pub fn transactions(&self) -> &[FullTransaction] {
        &self.vtx
    }

    /// Returns the block height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Returns the block hash, in wire order.
    pub fn hash(&self) -> [u8; 32] {
        self.hdr.cached_hash
    }

    /// Returns the block hash as big-endian hex, as shown by block explorers.
    pub fn display_hash(&self) -> String {
        let mut hash = self.hdr.cached_hash;
        hash.reverse();
        hex::encode(hash)
    }

    /// Decodes a hex encoded block.
    ///
    /// The whole input must be consumed.
    pub fn parse_from_hex(data: &str, txid: Option<Vec<Vec<u8>>>) -> Result<Self, ParseError> {
        let raw_data = hex::decode(data.trim())?;
        let (remaining_data, full_block) = Self::parse_from_slice(&raw_data, txid, None)?;
        if !remaining_data.is_empty() {
            return Err(ParseError::InvalidData(format!(
                "{} trailing bytes after block",
                remaining_data.len()
            )));
        }
        Ok(full_block)
    }

    /// Converts a full block into a compact block.
    ///
    /// Only transactions with Orchard actions are kept, each with its index in
    /// the full block.
    pub fn into_compact(self, orchard_commitment_tree_size: u32) -> Result<CompactBlock, ParseError> {
        let vtx = self
            .vtx
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.has_shielded_elements())
            .map(|(index, tx)| tx.to_compact(index as u64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompactBlock {
            proto_version: COMPACT_BLOCK_PROTO_VERSION,
            height: self.height,
            hash: self.hdr.cached_hash.to_vec(),
            prev_hash: self.hdr.raw_block_header.hash_prev_block.to_vec(),
            time: self.hdr.raw_block_header.time,
            header: Vec::new(),
            vtx,
            chain_metadata: Some(ChainMetadata {
                sapling_commitment_tree_size: 0,
                orchard_commitment_tree_size,
            }),
        })
    }

    /// Extracts the block height from the coinbase script (BIP-34).
    fn get_block_height(transactions: &[FullTransaction]) -> Result<u64, ParseError> {
        let script_sig = transactions
            .first()
            .and_then(|coinbase| coinbase.transparent_inputs().into_iter().next())
            .ok_or_else(|| ParseError::FieldNotFound("coinbase script sig".to_string()))?;
        let mut cursor = Cursor::new(script_sig.as_slice());
        let height = read_zcash_script_i64(&mut cursor, "coinbase height")?;
        if height == GENESIS_COINBASE_MARKER {
            return Ok(0);
        }
        u64::try_from(height).map_err(|_| {
            ParseError::InvalidData(format!("negative block height {height} in coinbase"))
        })
    }
}

/// Decodes big-endian display hex txids into wire order byte vectors.
pub fn display_txids_to_server(txids: Vec<String>) -> Result<Vec<Vec<u8>>, ParseError> {
    txids
        .iter()
        .map(|txid| {
            let mut bytes = hex::decode(txid)?;
            if bytes.len() != 32 {
                return Err(ParseError::InvalidData(format!(
                    "txid must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
            bytes.reverse();
            Ok(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::{
        block, coinbase_input, coinbase_transaction, height_script, transparent_output,
        v4_transaction, v5_transaction, SOLUTION_LEN,
    };

    fn txid(n: u8) -> Vec<u8> {
        vec![n; 32]
    }

    #[test]
    fn block_decode_recovers_height_and_hash() {
        let txs = vec![
            coinbase_transaction(1_000_000),
            v5_transaction(&[], &[transparent_output(7, 25)], 0),
            v5_transaction(&[], &[], 2),
        ];
        let raw = block([0x11; 32], 1_700_000_000, &txs);

        let (rest, full) =
            FullBlock::parse_from_slice(&raw, Some(vec![txid(1), txid(2), txid(3)]), None)
                .unwrap();
        assert!(rest.is_empty());
        assert_eq!(full.height(), 1_000_000);
        assert_eq!(full.transactions().len(), 3);
        assert_eq!(full.header().hash_prev_block(), [0x11; 32]);
        assert_eq!(full.header().time(), 1_700_000_000);

        let header_len = 4 + 32 * 3 + 4 + 4 + 32 + 3 + SOLUTION_LEN;
        let expected_hash: [u8; 32] = Sha256::digest(Sha256::digest(&raw[..header_len])).into();
        assert_eq!(full.hash(), expected_hash);
        assert_eq!(full.header().raw_bytes(), &raw[..header_len]);

        let mut display = expected_hash;
        display.reverse();
        assert_eq!(full.display_hash(), hex::encode(display));
    }

    #[test]
    fn compact_block_keeps_only_shielded_transactions() {
        let txs = vec![
            coinbase_transaction(42),
            v5_transaction(&[], &[transparent_output(7, 25)], 0),
            v5_transaction(&[], &[], 1),
        ];
        let raw = block([0x22; 32], 1234, &txs);
        let full =
            FullBlock::parse_from_hex(&hex::encode(&raw), Some(vec![txid(1), txid(2), txid(3)]))
                .unwrap();
        let hash = full.hash();

        let compact = full.into_compact(77).unwrap();
        assert_eq!(compact.proto_version, 1);
        assert_eq!(compact.height, 42);
        assert_eq!(compact.hash, hash.to_vec());
        assert_eq!(compact.prev_hash, vec![0x22; 32]);
        assert_eq!(compact.time, 1234);
        assert!(compact.header.is_empty());
        assert_eq!(compact.vtx.len(), 1);
        assert_eq!(compact.vtx[0].index, 2);
        assert_eq!(compact.vtx[0].hash, txid(3));
        assert_eq!(compact.vtx[0].actions.len(), 1);
        assert_eq!(
            compact.chain_metadata,
            Some(ChainMetadata {
                sapling_commitment_tree_size: 0,
                orchard_commitment_tree_size: 77,
            })
        );
    }

    #[test]
    fn genesis_marker_maps_to_height_zero() {
        let genesis = v4_transaction(
            &[coinbase_input(&[0x04, 0xff, 0xff, 0x07, 0x1f])],
            &[transparent_output(0, 25)],
            0,
            0,
            0,
        );
        let raw = block([0u8; 32], 0, &[genesis]);
        let full = FullBlock::parse_from_hex(&hex::encode(raw), None).unwrap();
        assert_eq!(full.height(), 0);
    }

    #[test]
    fn small_heights_use_opcodes() {
        assert_eq!(height_script(5), vec![0x55]);
        let raw = block([0u8; 32], 0, &[coinbase_transaction(5)]);
        let full = FullBlock::parse_from_hex(&hex::encode(raw), None).unwrap();
        assert_eq!(full.height(), 5);
    }

    #[test]
    fn block_errors() {
        let txs = vec![coinbase_transaction(10), v5_transaction(&[], &[], 1)];
        let raw = block([0u8; 32], 0, &txs);

        // Wrong number of txids.
        assert!(matches!(
            FullBlock::parse_from_slice(&raw, Some(vec![txid(1)]), None),
            Err(ParseError::InvalidData(_))
        ));

        // A failing transaction fails the whole block.
        let truncated = &raw[..raw.len() - 10];
        assert!(matches!(
            FullBlock::parse_from_slice(truncated, None, None),
            Err(ParseError::Truncated {
                field: "TransactionData::bindingSigOrchard"
            })
        ));

        // Trailing bytes are rejected by the hex entry point.
        let mut padded = raw.clone();
        padded.push(0);
        assert!(FullBlock::parse_from_hex(&hex::encode(padded), None).is_err());

        // Missing txids only fail at projection time.
        let full = FullBlock::parse_from_hex(&hex::encode(&raw), None).unwrap();
        assert!(matches!(
            full.into_compact(0),
            Err(ParseError::FieldNotParsed("txid"))
        ));
    }

    #[test]
    fn display_txids_are_reversed() {
        let mut display = "00".repeat(31);
        display.push_str("ff");
        let wire = display_txids_to_server(vec![display]).unwrap();
        assert_eq!(wire[0][0], 0xff);
        assert_eq!(wire[0][31], 0x00);

        assert!(display_txids_to_server(vec!["abcd".to_string()]).is_err());
        assert!(display_txids_to_server(vec!["zz".to_string()]).is_err());
    }
}
