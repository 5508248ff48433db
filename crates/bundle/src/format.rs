//! Bundle binary format constants and header/index-table read/write helpers.
//!
//! ## Header (12 bytes, always at offset 0)
//!
//! ```text
//! [signature: u32 LE = 0x13AF][reserved: u32 LE = 0][index_offset: u32 LE]
//! ```
//!
//! ## Index table (at `index_offset`)
//!
//! ```text
//! [count: u32 LE]
//! repeated: [name_len: 7-bit varint][name: UTF-8][time: i64 LE]
//!           [offset: u32 LE][length: u32 LE][allocated_size: u32 LE]
//! ```
//!
//! `time` is milliseconds since the Unix epoch (negative before it).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Result as IoResult, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::index::Descriptor;

/// Magic number at the start of every bundle file.
pub const SIGNATURE: u32 = 0x13AF;

/// Size of the header in bytes: 4 (`signature`) + 4 (`reserved`) + 4 (`index_offset`).
pub const HEADER_SIZE: u64 = 4 + 4 + 4;

/// Largest asset name we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
pub const MAX_NAME_BYTES: usize = 64 * 1024;

/// Largest value representable by the 32-bit on-disk offsets.
pub const MAX_FILE_OFFSET: u64 = u32::MAX as u64;

/// Parsed bundle header. The signature is kept raw so the caller can decide
/// how to report a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub signature: u32,
    pub reserved: u32,
    pub index_offset: u32,
}

/// Writes the 12-byte header to `w`. The reserved field is always zero.
pub fn write_header<W: Write>(w: &mut W, index_offset: u32) -> IoResult<()> {
    w.write_u32::<LittleEndian>(SIGNATURE)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(index_offset)?;
    Ok(())
}

/// Reads the 12-byte header from the current position of `r`.
pub fn read_header<R: Read>(r: &mut R) -> IoResult<Header> {
    let signature = r.read_u32::<LittleEndian>()?;
    let reserved = r.read_u32::<LittleEndian>()?;
    let index_offset = r.read_u32::<LittleEndian>()?;
    Ok(Header {
        signature,
        reserved,
        index_offset,
    })
}

/// Writes one index-table record.
pub fn write_record<W: Write>(w: &mut W, name: &str, d: &Descriptor) -> IoResult<()> {
    write_string(w, name)?;
    w.write_i64::<LittleEndian>(to_millis(d.time))?;
    w.write_u32::<LittleEndian>(to_u32(d.offset)?)?;
    w.write_u32::<LittleEndian>(to_u32(d.length)?)?;
    w.write_u32::<LittleEndian>(to_u32(d.allocated_size)?)?;
    Ok(())
}

/// Reads one index-table record.
pub fn read_record<R: Read>(r: &mut R) -> IoResult<(String, Descriptor)> {
    let name = read_string(r)?;
    let time = from_millis(r.read_i64::<LittleEndian>()?);
    let offset = r.read_u32::<LittleEndian>()? as u64;
    let length = r.read_u32::<LittleEndian>()? as u64;
    let allocated_size = r.read_u32::<LittleEndian>()? as u64;
    Ok((
        name,
        Descriptor {
            time,
            offset,
            length,
            allocated_size,
        },
    ))
}

/// Writes `s` with a 7-bit variable-length byte-count prefix.
pub fn write_string<W: Write>(w: &mut W, s: &str) -> IoResult<()> {
    let mut n = s.len() as u64;
    while n >= 0x80 {
        w.write_u8((n as u8) | 0x80)?;
        n >>= 7;
    }
    w.write_u8(n as u8)?;
    w.write_all(s.as_bytes())
}

/// Reads a string written by [`write_string`].
pub fn read_string<R: Read>(r: &mut R) -> IoResult<String> {
    let mut len: u64 = 0;
    let mut shift = 0u32;
    loop {
        let b = r.read_u8()?;
        len |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "name length prefix is longer than 5 bytes",
            ));
        }
    }

    let len = len as usize;
    if len > MAX_NAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("name length {} exceeds maximum {}", len, MAX_NAME_BYTES),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Narrows an in-memory offset or size to its 32-bit on-disk width.
pub fn to_u32(v: u64) -> IoResult<u32> {
    u32::try_from(v).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("value {} does not fit the 32-bit bundle format", v),
        )
    })
}

/// Milliseconds since the Unix epoch, negative for earlier times.
pub fn to_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

pub fn from_millis(ms: i64) -> SystemTime {
    if ms >= 0 {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(ms.unsigned_abs())
    }
}

/// Current time truncated to the on-disk millisecond precision, so a stamp
/// survives a close/open cycle unchanged.
pub fn now_millis() -> SystemTime {
    from_millis(to_millis(SystemTime::now()))
}
