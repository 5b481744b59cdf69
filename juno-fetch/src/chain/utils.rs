//! Blockchain data parsing utilities.
//!
//! Every reader works over a `Cursor<&[u8]>` and checks the remaining length
//! before touching (or allocating for) the data, so a short buffer always
//! fails with [`ParseError::Truncated`] naming the field being read.

use std::io::Cursor;

use crate::chain::error::ParseError;

/// Largest compact size accepted from the wire.
pub const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Used for decoding zcash blocks from a bytestring.
pub trait ParseFromSlice {
    /// Reads data from a bytestring, consuming data read, and returns an instance of self along with the remaining data in the bytestring given.
    ///
    /// txid is given as an input as the node reports it alongside the raw block, it is never computed here.
    ///
    /// tx_version is reserved for fields whose layout depends on the transaction version.
    fn parse_from_slice(
        data: &[u8],
        txid: Option<Vec<Vec<u8>>>,
        tx_version: Option<u32>,
    ) -> Result<(&[u8], Self), ParseError>
    where
        Self: Sized;
}

/// Number of bytes left after the cursor position.
pub(crate) fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    let len = cursor.get_ref().len() as u64;
    len.saturating_sub(cursor.position()) as usize
}

/// Returns the unread tail of the cursor's buffer.
pub(crate) fn remaining_slice<'a>(cursor: &Cursor<&'a [u8]>) -> &'a [u8] {
    let data: &'a [u8] = *cursor.get_ref();
    let start = (cursor.position() as usize).min(data.len());
    &data[start..]
}

/// Moves the cursor to the start of `rest`, which must be a tail of the cursor's buffer.
pub(crate) fn advance_to(cursor: &mut Cursor<&[u8]>, rest: &[u8]) {
    let len = cursor.get_ref().len();
    cursor.set_position((len - rest.len()) as u64);
}

fn take<'a>(
    cursor: &mut Cursor<&'a [u8]>,
    n: usize,
    field: &'static str,
) -> Result<&'a [u8], ParseError> {
    if remaining(cursor) < n {
        return Err(ParseError::Truncated { field });
    }
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    cursor.set_position((start + n) as u64);
    Ok(&data[start..start + n])
}

/// Skips `n` bytes, failing if fewer remain.
pub fn skip_bytes(
    cursor: &mut Cursor<&[u8]>,
    n: usize,
    field: &'static str,
) -> Result<(), ParseError> {
    take(cursor, n, field).map(|_| ())
}

/// Reads `n` bytes into an owned buffer.
pub fn read_bytes(
    cursor: &mut Cursor<&[u8]>,
    n: usize,
    field: &'static str,
) -> Result<Vec<u8>, ParseError> {
    take(cursor, n, field).map(<[u8]>::to_vec)
}

/// Reads exactly 32 bytes, as used for hashes and keys.
pub fn read_bytes_32(
    cursor: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<[u8; 32], ParseError> {
    let mut out = [0u8; 32];
    out.copy_from_slice(take(cursor, 32, field)?);
    Ok(out)
}

/// Reads a single byte.
pub fn read_u8(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, ParseError> {
    Ok(take(cursor, 1, field)?[0])
}

/// Reads a little-endian u16.
pub fn read_u16(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u16, ParseError> {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(take(cursor, 2, field)?);
    Ok(u16::from_le_bytes(buf))
}

/// Reads a little-endian u32.
pub fn read_u32(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u32, ParseError> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(cursor, 4, field)?);
    Ok(u32::from_le_bytes(buf))
}

/// Reads a little-endian u64.
pub fn read_u64(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u64, ParseError> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(take(cursor, 8, field)?);
    Ok(u64::from_le_bytes(buf))
}

/// Reads a little-endian i64.
pub fn read_i64(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<i64, ParseError> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(take(cursor, 8, field)?);
    Ok(i64::from_le_bytes(buf))
}

/// Returns how many of `count` items, each at least `min_item_len` bytes,
/// to reserve space for: never more than the rest of the input could hold.
///
/// The items are still read one by one, so a short input fails on the first
/// field that cannot be read.
pub fn capped_capacity(
    cursor: &Cursor<&[u8]>,
    count: u64,
    min_item_len: usize,
) -> Result<usize, ParseError> {
    let count = usize::try_from(count)?;
    Ok(count.min(remaining(cursor) / min_item_len.max(1)))
}

/// Reads a compact-size length followed by that many bytes.
pub fn read_compact_length_prefixed(
    cursor: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<Vec<u8>, ParseError> {
    let len = CompactSize::read(cursor, field)?;
    read_bytes(cursor, usize::try_from(len)?, field)
}

/// Skips a compact-size length and the bytes it covers.
pub fn skip_compact_length_prefixed(
    cursor: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<(), ParseError> {
    let len = CompactSize::read(cursor, field)?;
    skip_bytes(cursor, usize::try_from(len)?, field)
}

/// Reads a script number push, as found at the start of a coinbase script.
///
/// Accepts OP_0, OP_1NEGATE, OP_1..OP_16, or a minimally encoded 1 to 8 byte
/// little-endian signed push.
pub fn read_zcash_script_i64(
    cursor: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<i64, ParseError> {
    let op = read_u8(cursor, field)?;
    match op {
        0x00 => Ok(0),
        0x4f => Ok(-1),
        0x51..=0x60 => Ok(i64::from(op) - 0x50),
        0x01..=0x08 => {
            let bytes = take(cursor, op as usize, field)?;
            decode_script_num(bytes).ok_or_else(|| {
                ParseError::InvalidData(format!("non-minimal script number in {field}"))
            })
        }
        _ => Err(ParseError::InvalidData(format!(
            "unexpected opcode {op:#04x} reading script number in {field}"
        ))),
    }
}

/// Decodes a minimal sign-magnitude little-endian script number.
fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    let (last, rest) = bytes.split_last()?;
    // The top byte may only be 0x00/0x80 when it carries the sign for a
    // magnitude whose own top bit is set.
    if last & 0x7f == 0 && rest.last().map_or(true, |b| b & 0x80 == 0) {
        return None;
    }
    let mut magnitude: u64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        let b = if i == bytes.len() - 1 { b & 0x7f } else { *b };
        magnitude |= u64::from(b) << (8 * i);
    }
    let magnitude = i64::try_from(magnitude).ok()?;
    if last & 0x80 != 0 {
        Some(-magnitude)
    } else {
        Some(magnitude)
    }
}

/// Bitcoin-style variable length integer.
///
/// <https://en.bitcoin.it/wiki/Protocol_documentation#Variable_length_integer>
pub struct CompactSize;

impl CompactSize {
    /// Reads a canonical compact size no larger than [`MAX_COMPACT_SIZE`].
    pub fn read(cursor: &mut Cursor<&[u8]>, field: &'static str) -> Result<u64, ParseError> {
        let flag = read_u8(cursor, field)?;
        let (value, min) = match flag {
            0xfd => (u64::from(read_u16(cursor, field)?), 0xfd),
            0xfe => (u64::from(read_u32(cursor, field)?), 0x1_0000),
            0xff => (read_u64(cursor, field)?, 0x1_0000_0000),
            n => (u64::from(n), 0),
        };
        if value < min {
            return Err(ParseError::InvalidCompactSize {
                field,
                reason: "non-canonical encoding",
            });
        }
        if value > MAX_COMPACT_SIZE {
            return Err(ParseError::InvalidCompactSize {
                field,
                reason: "exceeds maximum size",
            });
        }
        Ok(value)
    }

    /// Writes the canonical encoding of `size`.
    pub fn write(out: &mut Vec<u8>, size: u64) {
        match size {
            0..=0xfc => out.push(size as u8),
            0xfd..=0xffff => {
                out.push(0xfd);
                out.extend_from_slice(&(size as u16).to_le_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                out.push(0xfe);
                out.extend_from_slice(&(size as u32).to_le_bytes());
            }
            _ => {
                out.push(0xff);
                out.extend_from_slice(&size.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_widths() {
        let cases: [(&[u8], u64); 4] = [
            (&[0x00], 0),
            (&[0xfc], 0xfc),
            (&[0xfd, 0xfd, 0x00], 0xfd),
            (&[0xfe, 0x00, 0x00, 0x01, 0x00], 0x1_0000),
        ];
        for (bytes, expected) in cases {
            let mut cursor = Cursor::new(bytes);
            assert_eq!(CompactSize::read(&mut cursor, "test").unwrap(), expected);
            assert_eq!(remaining(&cursor), 0);
        }
    }

    #[test]
    fn compact_size_rejects_non_canonical_and_oversized() {
        let non_canonical: &[u8] = &[0xfd, 0x10, 0x00];
        assert!(matches!(
            CompactSize::read(&mut Cursor::new(non_canonical), "len"),
            Err(ParseError::InvalidCompactSize { field: "len", .. })
        ));

        let oversized: &[u8] = &[0xfe, 0x01, 0x00, 0x00, 0x02];
        assert!(matches!(
            CompactSize::read(&mut Cursor::new(oversized), "len"),
            Err(ParseError::InvalidCompactSize { .. })
        ));

        let mut wide = vec![0xff];
        wide.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        assert!(matches!(
            CompactSize::read(&mut Cursor::new(wide.as_slice()), "len"),
            Err(ParseError::InvalidCompactSize { .. })
        ));
    }

    #[test]
    fn compact_size_write_matches_read() {
        for value in [0u64, 0xfc, 0xfd, 0x1234, 0xffff, 0x1_0000, MAX_COMPACT_SIZE] {
            let mut buf = Vec::new();
            CompactSize::write(&mut buf, value);
            assert_eq!(
                CompactSize::read(&mut Cursor::new(buf.as_slice()), "v").unwrap(),
                value
            );
        }
    }

    #[test]
    fn truncated_reads_name_the_field() {
        let data: &[u8] = &[1, 2, 3];
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            read_u32(&mut cursor, "Header"),
            Err(ParseError::Truncated { field: "Header" })
        ));
        // A failed read leaves the cursor where it was.
        assert_eq!(cursor.position(), 0);
        assert!(matches!(
            read_bytes(&mut cursor, usize::MAX, "Huge"),
            Err(ParseError::Truncated { field: "Huge" })
        ));
        skip_bytes(&mut cursor, 3, "All").unwrap();
        assert!(skip_bytes(&mut cursor, 1, "Past").is_err());
    }

    #[test]
    fn capacity_is_capped_by_remaining_input() {
        let data = [0u8; 100];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(capped_capacity(&cursor, 3, 10).unwrap(), 3);
        assert_eq!(capped_capacity(&cursor, MAX_COMPACT_SIZE, 10).unwrap(), 10);
        cursor.set_position(95);
        assert_eq!(capped_capacity(&cursor, 2, 10).unwrap(), 0);
        assert_eq!(capped_capacity(&cursor, 2, 0).unwrap(), 2);
    }

    #[test]
    fn length_prefixed_reads() {
        let data: &[u8] = &[0x02, 0xaa, 0xbb, 0x01, 0xcc, 0x05, 0x00];
        let mut cursor = Cursor::new(data);
        assert_eq!(
            read_compact_length_prefixed(&mut cursor, "a").unwrap(),
            vec![0xaa, 0xbb]
        );
        skip_compact_length_prefixed(&mut cursor, "b").unwrap();
        assert!(matches!(
            read_compact_length_prefixed(&mut cursor, "c"),
            Err(ParseError::Truncated { field: "c" })
        ));
    }

    #[test]
    fn script_numbers() {
        let cases: [(&[u8], i64); 7] = [
            (&[0x00], 0),
            (&[0x4f], -1),
            (&[0x51], 1),
            (&[0x60], 16),
            (&[0x01, 0x11], 17),
            (&[0x02, 0x80, 0x00], 128),
            (&[0x03, 0x40, 0x42, 0x0f], 1_000_000),
        ];
        for (bytes, expected) in cases {
            let mut cursor = Cursor::new(bytes);
            assert_eq!(
                read_zcash_script_i64(&mut cursor, "height").unwrap(),
                expected
            );
        }

        let negative: &[u8] = &[0x01, 0x85];
        assert_eq!(
            read_zcash_script_i64(&mut Cursor::new(negative), "n").unwrap(),
            -5
        );

        let padded: &[u8] = &[0x02, 0x05, 0x00];
        assert!(read_zcash_script_i64(&mut Cursor::new(padded), "n").is_err());

        let opcode: &[u8] = &[0x76];
        assert!(read_zcash_script_i64(&mut Cursor::new(opcode), "n").is_err());
    }
}
