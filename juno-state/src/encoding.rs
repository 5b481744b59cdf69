//! Holds traits and primitive functions for the block cache's on-disk records.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Wire-format version tags.
pub mod version {
    /// Tag byte for data encoded with *v1* layout.
    pub const V1: u8 = 1;

    // Add new versions as required.
    // pub const V2: u8 = 2;
}

/// # On-disk format: one-byte version tag
///
/// ┌─ byte 0 ─┬──────────── body depends on that tag ────────────┐
/// │ version  │              (little-endian by default)          │
/// └──────────┴──────────────────────────────────────────────────┘
///
/// * `Self::VERSION` = the tag **this build *writes***.
/// * On **read**, the tag is checked: if it equals `Self::VERSION`,
///   `decode_latest` is called, otherwise the matching `decode_vN` helper
///   (which defaults to "unsupported").
///
/// When a layout changes, add a new tag to [`version`], a `decode_vN` method
/// here and a branch in [`JunoVersionedSerde::decode_body`].
pub trait JunoVersionedSerde: Sized {
    /// Tag this build writes.
    const VERSION: u8;

    /// Encode **only** the body (no tag).
    fn encode_body<W: Write>(&self, w: &mut W) -> io::Result<()>;

    /// Parses a body whose tag equals `Self::VERSION`.
    fn decode_latest<R: Read>(r: &mut R) -> io::Result<Self>;

    #[inline(always)]
    #[allow(unused)]
    /// Decode an older v1 version
    fn decode_v1<R: Read>(r: &mut R) -> io::Result<Self> {
        Err(io::Error::new(io::ErrorKind::InvalidData, "v1 unsupported"))
    }

    #[inline]
    /// Decode the body, dispatching to the appropriate decode_vx function
    fn decode_body<R: Read>(r: &mut R, version_tag: u8) -> io::Result<Self> {
        if version_tag == Self::VERSION {
            Self::decode_latest(r)
        } else {
            match version_tag {
                version::V1 => Self::decode_v1(r),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unsupported record version tag",
                )),
            }
        }
    }

    #[inline]
    /// Writes the version tag, then the body.
    fn serialize<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&[Self::VERSION])?;
        self.encode_body(&mut w)
    }

    #[inline]
    /// Reads the version tag, then decodes the body.
    fn deserialize<R: Read>(mut r: R) -> io::Result<Self> {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        Self::decode_body(&mut r, tag[0])
    }

    /// Serialize into a `Vec<u8>` (tag + body).
    #[inline]
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(&mut buf)?;
        Ok(buf)
    }

    /// Reconstruct from a `&[u8]` (expects tag + body).
    #[inline]
    fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = io::Cursor::new(data);
        Self::deserialize(&mut cursor)
    }
}

/// Defines the fixed encoded length of an on-disk record.
pub trait FixedEncodedLen {
    /// the fixed encoded length of a record *not* including the version byte.
    const ENCODED_LEN: usize;

    /// Length of version tag in bytes.
    const VERSION_TAG_LEN: usize = 1;

    /// the fixed encoded length of a record *including* the version byte.
    const VERSIONED_LEN: usize = Self::ENCODED_LEN + Self::VERSION_TAG_LEN;
}

/// Reads a u32 in LE format.
#[inline]
pub fn read_u32_le<R: Read>(mut r: R) -> io::Result<u32> {
    r.read_u32::<LittleEndian>()
}

/// Writes a u32 in LE format.
#[inline]
pub fn write_u32_le<W: Write>(mut w: W, v: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(v)
}

/// Read exactly `N` bytes **as-is**.
#[inline]
pub fn read_fixed_le<const N: usize, R: Read>(mut r: R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write an `[u8; N]` **as-is**.
#[inline]
pub fn write_fixed_le<const N: usize, W: Write>(mut w: W, bytes: &[u8; N]) -> io::Result<()> {
    w.write_all(bytes)
}
