//! On-disk records of the block cache.

use crate::encoding::{
    read_fixed_le, read_u32_le, version, write_fixed_le, write_u32_le, FixedEncodedLen,
    JunoVersionedSerde,
};

use blake2::{digest::consts::U32, Blake2b, Digest};
use std::io::{self, Read, Write};

type Blake2b256 = Blake2b<U32>;

/// Index file record, one per cached height.
///
/// Encoded Format:
///
/// ┌─── byte 0 ───┬─── 4 bytes ───┬──── 4 bytes ────┬──── 32 bytes ────┐
/// │   version    │  height (LE)  │ data length (LE)│ block hash       │
/// └──────────────┴───────────────┴─────────────────┴──────────────────┘
///
/// `data length` counts the block body only, the checksum in front of it in
/// the blocks file is not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub(crate) height: u32,
    pub(crate) data_len: u32,
    pub(crate) hash: [u8; 32],
}

impl JunoVersionedSerde for IndexEntry {
    const VERSION: u8 = version::V1;

    fn encode_body<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32_le(&mut *w, self.height)?;
        write_u32_le(&mut *w, self.data_len)?;
        write_fixed_le::<32, _>(&mut *w, &self.hash)
    }

    fn decode_latest<R: Read>(r: &mut R) -> io::Result<Self> {
        Self::decode_v1(r)
    }

    fn decode_v1<R: Read>(r: &mut R) -> io::Result<Self> {
        let height = read_u32_le(&mut *r)?;
        let data_len = read_u32_le(&mut *r)?;
        let hash = read_fixed_le::<32, _>(&mut *r)?;
        Ok(Self {
            height,
            data_len,
            hash,
        })
    }
}

impl FixedEncodedLen for IndexEntry {
    const ENCODED_LEN: usize = 4 + 4 + 32;
}

/// A block as laid out in the blocks file.
///
/// ┌──── 32 bytes ────┬──── data length bytes ────┐
/// │ B2B256 checksum  │ prost encoded CompactBlock│
/// └──────────────────┴───────────────────────────┘
///
/// The checksum covers `height (u64 LE) || body`, so a record copied to the
/// wrong height fails verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredBlock {
    checksum: [u8; 32],
    body: Vec<u8>,
}

impl StoredBlock {
    /// Bytes taken by the checksum in front of each body.
    pub(crate) const CHECKSUM_LEN: usize = 32;

    /// Create a new record, hashing `height || body`.
    pub(crate) fn new(height: u64, body: Vec<u8>) -> Self {
        let checksum = Self::blake2b256(height, &body);
        Self { checksum, body }
    }

    /// Splits a raw record into checksum and body.
    ///
    /// Returns `None` if the record is too short to hold a checksum.
    pub(crate) fn from_record(record: &[u8]) -> Option<Self> {
        if record.len() < Self::CHECKSUM_LEN {
            return None;
        }
        let (checksum, body) = record.split_at(Self::CHECKSUM_LEN);
        let mut out = [0u8; 32];
        out.copy_from_slice(checksum);
        Some(Self {
            checksum: out,
            body: body.to_vec(),
        })
    }

    /// Returns `true` if the checksum matches `blake2b256(height || body)`.
    pub(crate) fn verify(&self, height: u64) -> bool {
        Self::blake2b256(height, &self.body) == self.checksum
    }

    /// Returns the encoded block.
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the record as written to disk.
    pub(crate) fn to_record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(Self::CHECKSUM_LEN + self.body.len());
        record.extend_from_slice(&self.checksum);
        record.extend_from_slice(&self.body);
        record
    }

    fn blake2b256(height: u64, body: &[u8]) -> [u8; 32] {
        let mut hasher = Blake2b256::new();
        hasher.update(height.to_le_bytes());
        hasher.update(body);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_entry_has_fixed_length() {
        let entry = IndexEntry {
            height: 7,
            data_len: 300,
            hash: [0xab; 32],
        };
        let bytes = entry.to_bytes().unwrap();
        assert_eq!(bytes.len(), IndexEntry::VERSIONED_LEN);
        assert_eq!(bytes[0], version::V1);
        assert_eq!(&bytes[1..5], &7u32.to_le_bytes());
        assert_eq!(IndexEntry::from_bytes(&bytes).unwrap(), entry);

        let mut bad_tag = bytes.clone();
        bad_tag[0] = 9;
        assert!(IndexEntry::from_bytes(&bad_tag).is_err());
        assert!(IndexEntry::from_bytes(&bytes[..20]).is_err());
    }

    #[test]
    fn stored_block_checksum_binds_height_and_body() {
        let stored = StoredBlock::new(10, vec![1, 2, 3]);
        assert!(stored.verify(10));
        assert!(!stored.verify(11));

        let mut record = stored.to_record();
        assert_eq!(record.len(), StoredBlock::CHECKSUM_LEN + 3);
        assert_eq!(StoredBlock::from_record(&record), Some(stored));

        record[33] ^= 0xff;
        let flipped = StoredBlock::from_record(&record).unwrap();
        assert!(!flipped.verify(10));
        assert!(StoredBlock::from_record(&record[..31]).is_none());
    }
}
