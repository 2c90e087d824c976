//! Checksummed binary blobs.
//!
//! Every whole file an index writes (symbol tables, the postings header) is
//! framed the same way:
//!
//! ```text
//! magic u32 | kind u32 | version u16 | reserved u16 | len u32 | payload | crc32 u32
//! ```
//!
//! The payload is `bincode`; the checksum covers the payload only. All
//! integers are little-endian.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{GlaiveError, Result};
use crate::storage::Storage;

/// File magic ("GLV1").
pub const MAGIC: u32 = 0x3156_4C47;

/// Current framing version.
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 16;

/// What a blob holds. Stored in the frame so one kind is never read as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlobKind {
    SymbolTable = 1,
    PostingsHeader = 2,
}

/// Serialize `value` into a framed blob.
pub fn encode<T: Serialize>(kind: BlobKind, value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| GlaiveError::invalid_argument("blob payload exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    out.write_u32::<LittleEndian>(MAGIC)?;
    out.write_u32::<LittleEndian>(kind as u32)?;
    out.write_u16::<LittleEndian>(VERSION)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(&payload);
    out.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    Ok(out)
}

/// Validate the frame of `bytes` and deserialize its payload.
pub fn decode<T: DeserializeOwned>(kind: BlobKind, bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(GlaiveError::invalid_format("blob too short"));
    }

    let mut header = Cursor::new(&bytes[..HEADER_LEN]);
    if header.read_u32::<LittleEndian>()? != MAGIC {
        return Err(GlaiveError::invalid_format("bad blob magic"));
    }
    let stored_kind = header.read_u32::<LittleEndian>()?;
    if stored_kind != kind as u32 {
        return Err(GlaiveError::invalid_format(format!(
            "blob kind mismatch: expected {}, found {stored_kind}",
            kind as u32
        )));
    }
    let version = header.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(GlaiveError::invalid_format(format!(
            "unsupported blob version {version}"
        )));
    }
    let _reserved = header.read_u16::<LittleEndian>()?;
    let len = header.read_u32::<LittleEndian>()? as usize;

    if bytes.len() != HEADER_LEN + len + 4 {
        return Err(GlaiveError::invalid_format("blob length mismatch"));
    }
    let payload = &bytes[HEADER_LEN..HEADER_LEN + len];
    let mut trailer = Cursor::new(&bytes[HEADER_LEN + len..]);
    let crc = trailer.read_u32::<LittleEndian>()?;
    if crc != crc32fast::hash(payload) {
        return Err(GlaiveError::invalid_format("blob checksum mismatch"));
    }

    Ok(bincode::deserialize(payload)?)
}

/// Encode `value` and write it to `name`.
pub fn write_blob<T: Serialize>(
    storage: &dyn Storage,
    name: &str,
    kind: BlobKind,
    value: &T,
) -> Result<()> {
    let bytes = encode(kind, value)?;
    storage.write_file(name, &bytes)
}

/// Read `name` and decode it.
pub fn read_blob<T: DeserializeOwned>(
    storage: &dyn Storage,
    name: &str,
    kind: BlobKind,
) -> Result<T> {
    let bytes = storage.read_file(name)?;
    decode(kind, &bytes)
}
