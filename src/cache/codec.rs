//! Bit-exact binary layout for persisted cache entries.
//!
//! Little-endian throughout: a `u32` magic, the cache key and optional
//! entity tag as `u64`-length-prefixed UTF-8, four `i64` timestamps, a
//! `u32`-counted list of length-prefixed header pairs, then the raw body
//! until end of file. The layout matches stores written by existing
//! deployments, so it is hand-rolled rather than derived.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use bytes::Bytes;

use crate::cache::entry::CacheEntry;

/// File magic. Also serves as the format version.
pub const ENTRY_MAGIC: u32 = 0x2015_0306;

/// Corrupt-length guard for the length-prefixed fields. The body is not
/// length-prefixed and is unaffected.
const MAX_FIELD_LEN: u64 = 1024 * 1024;

/// Serialize one entry, header first, body to the end of the stream.
pub fn write_entry<W: Write>(writer: &mut W, key: &str, entry: &CacheEntry) -> io::Result<()> {
    write_header(writer, key, entry)?;
    writer.write_all(&entry.data)
}

/// Serialize the header fields only (everything except the body).
pub fn write_header<W: Write>(writer: &mut W, key: &str, entry: &CacheEntry) -> io::Result<()> {
    write_u32(writer, ENTRY_MAGIC)?;
    write_string(writer, key)?;
    write_string(writer, entry.etag.as_deref().unwrap_or(""))?;
    write_i64(writer, entry.server_date)?;
    write_i64(writer, entry.last_modified)?;
    write_i64(writer, entry.ttl)?;
    write_i64(writer, entry.soft_ttl)?;
    let count = u32::try_from(entry.response_headers.len())
        .map_err(|_| corrupt("too many response headers"))?;
    write_u32(writer, count)?;
    for (name, value) in &entry.response_headers {
        write_string(writer, name)?;
        write_string(writer, value)?;
    }
    Ok(())
}

/// Deserialize a full entry, reading the body to end of stream.
pub fn read_entry<R: Read>(reader: &mut R) -> io::Result<(String, CacheEntry)> {
    let (key, mut entry) = read_header(reader)?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    entry.data = Bytes::from(data);
    Ok((key, entry))
}

/// Deserialize the header fields only, leaving the body unread. The
/// returned entry has empty `data`.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<(String, CacheEntry)> {
    let magic = read_u32(reader)?;
    if magic != ENTRY_MAGIC {
        return Err(corrupt(format!("bad magic 0x{magic:08x}")));
    }
    let key = read_string(reader)?;
    let etag = match read_string(reader)? {
        s if s.is_empty() => None,
        s => Some(s),
    };
    let server_date = read_i64(reader)?;
    let last_modified = read_i64(reader)?;
    let ttl = read_i64(reader)?;
    let soft_ttl = read_i64(reader)?;
    let header_count = read_u32(reader)?;
    if u64::from(header_count) > MAX_FIELD_LEN {
        return Err(corrupt("implausible header count"));
    }
    let mut response_headers = HashMap::with_capacity(header_count as usize);
    for _ in 0..header_count {
        let name = read_string(reader)?;
        let value = read_string(reader)?;
        response_headers.insert(name, value);
    }
    let entry = CacheEntry {
        data: Bytes::new(),
        etag,
        server_date,
        last_modified,
        ttl,
        soft_ttl,
        response_headers,
    };
    Ok((key, entry))
}

fn corrupt(detail: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, detail.into())
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_all(&(value.len() as u64).to_le_bytes())?;
    writer.write_all(value.as_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_u64(reader)?;
    if len > MAX_FIELD_LEN {
        return Err(corrupt(format!("implausible field length {len}")));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| corrupt("field is not valid UTF-8"))
}
