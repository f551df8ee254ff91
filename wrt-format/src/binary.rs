//! LEB128 integers, length-prefixed names, and section headers.
//!
//! Every reader here takes `(bytes, pos)` and returns `(value, next_pos)`,
//! failing rather than panicking on truncation or overflow. Callers are
//! expected to slice `bytes` down to one section's body first, so that a
//! reader can never walk past its section boundary into the next one.

use wrt_error::{codes, Error, ErrorCategory, Result};

#[cfg(feature = "std")]
use std::vec::Vec;
#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::vec::Vec;

fn malformed(code: u16, msg: &'static str) -> Error {
    #[cfg(feature = "alloc")]
    {
        Error::new(ErrorCategory::Malformed, code, msg)
    }
    #[cfg(not(feature = "alloc"))]
    {
        let _ = msg;
        Error::new(ErrorCategory::Malformed, code)
    }
}

/// Read a single byte.
pub fn read_u8(bytes: &[u8], pos: usize) -> Result<(u8, usize)> {
    bytes
        .get(pos)
        .map(|b| (*b, pos + 1))
        .ok_or_else(|| malformed(codes::TRUNCATED_SECTION, "unexpected end of input"))
}

/// Read an unsigned LEB128 `u32`. Fails if the encoding is wider than 5
/// bytes (32 bits needs at most 5 groups of 7 bits).
pub fn read_leb128_u32(bytes: &[u8], pos: usize) -> Result<(u32, usize)> {
    let (v, n) = read_leb128_u64_bounded(bytes, pos, 5)?;
    if v > u64::from(u32::MAX) {
        return Err(malformed(codes::LEB128_TOO_LONG, "u32 LEB128 overflow"));
    }
    Ok((v as u32, n))
}

/// Read a signed LEB128 `i32`. Fails if wider than 5 bytes.
pub fn read_leb128_i32(bytes: &[u8], pos: usize) -> Result<(i32, usize)> {
    let (v, n) = read_leb128_i64_bounded(bytes, pos, 5, 32)?;
    Ok((v as i32, n))
}

/// Read a signed LEB128 `i64`. Fails if wider than 10 bytes.
pub fn read_leb128_i64(bytes: &[u8], pos: usize) -> Result<(i64, usize)> {
    read_leb128_i64_bounded(bytes, pos, 10, 64)
}

/// Read an unsigned LEB128 `u64`. Fails if wider than 10 bytes.
pub fn read_leb128_u64(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    read_leb128_u64_bounded(bytes, pos, 10)
}

fn read_leb128_u64_bounded(bytes: &[u8], pos: usize, max_bytes: usize) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut offset = 0usize;

    loop {
        if offset >= max_bytes {
            return Err(malformed(codes::LEB128_TOO_LONG, "LEB128 exceeds maximum width"));
        }
        let (byte, next) = read_u8(bytes, pos + offset)?;
        offset = next - pos;

        if shift < 64 {
            result |= u64::from(byte & 0x7f) << shift;
        }
        if byte & 0x80 == 0 {
            return Ok((result, pos + offset));
        }
        shift += 7;
    }
}

fn read_leb128_i64_bounded(
    bytes: &[u8],
    pos: usize,
    max_bytes: usize,
    value_bits: u32,
) -> Result<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut offset = 0usize;
    let mut byte;

    loop {
        if offset >= max_bytes {
            return Err(malformed(codes::LEB128_TOO_LONG, "LEB128 exceeds maximum width"));
        }
        let (b, next) = read_u8(bytes, pos + offset)?;
        byte = b;
        offset = next - pos;

        if shift < 64 {
            result |= i64::from(byte & 0x7f) << shift;
        }
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }

    if shift < value_bits && (byte & 0x40) != 0 {
        result |= -1i64 << shift;
    }
    Ok((result, pos + offset))
}

/// Read an IEEE-754 `f32`, little-endian.
pub fn read_f32(bytes: &[u8], pos: usize) -> Result<(f32, usize)> {
    let end = pos + 4;
    let chunk = bytes
        .get(pos..end)
        .ok_or_else(|| malformed(codes::TRUNCATED_SECTION, "truncated f32"))?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(chunk);
    Ok((f32::from_le_bytes(buf), end))
}

/// Read an IEEE-754 `f64`, little-endian.
pub fn read_f64(bytes: &[u8], pos: usize) -> Result<(f64, usize)> {
    let end = pos + 8;
    let chunk = bytes
        .get(pos..end)
        .ok_or_else(|| malformed(codes::TRUNCATED_SECTION, "truncated f64"))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(chunk);
    Ok((f64::from_le_bytes(buf), end))
}

/// Read a `(u32 length)(UTF-8 bytes)` name, returning the decoded `&str`
/// slice borrowed from `bytes` and the position just past it.
pub fn read_name(bytes: &[u8], pos: usize) -> Result<(&str, usize)> {
    let (len, pos) = read_leb128_u32(bytes, pos)?;
    let len = len as usize;
    let end = pos
        .checked_add(len)
        .ok_or_else(|| malformed(codes::TRUNCATED_SECTION, "name length overflow"))?;
    let raw = bytes
        .get(pos..end)
        .ok_or_else(|| malformed(codes::TRUNCATED_SECTION, "name exceeds section bounds"))?;
    let s = core::str::from_utf8(raw)
        .map_err(|_| malformed(codes::INVALID_UTF8, "name is not valid UTF-8"))?;
    Ok((s, end))
}

/// Read a `(id: u8)(size: u32 LEB)` section header. The caller is
/// responsible for slicing out `size` bytes as the section body.
pub fn read_section_header(bytes: &[u8], pos: usize) -> Result<(u8, u32, usize)> {
    let (id, pos) = read_u8(bytes, pos)?;
    let (size, pos) = read_leb128_u32(bytes, pos)?;
    Ok((id, size, pos))
}

/// Slice out exactly `len` bytes starting at `pos`, failing if that would
/// run past the end of `bytes` — the core bound that keeps one section
/// from over-reading into the next.
pub fn bounded_slice(bytes: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    let end = pos
        .checked_add(len)
        .ok_or_else(|| malformed(codes::SECTION_SIZE_MISMATCH, "section size overflow"))?;
    bytes
        .get(pos..end)
        .ok_or_else(|| malformed(codes::SECTION_SIZE_MISMATCH, "section size exceeds module bounds"))
}

/// Write an unsigned LEB128 `u32`, the inverse of [`read_leb128_u32`].
/// Test-only: used by the round-trip re-emitter, never exposed as a
/// general encoding API.
#[cfg(any(feature = "std", feature = "alloc"))]
pub fn write_leb128_u32(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut value = value;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if value == 0 {
            break;
        }
    }
    result
}

/// Write a `(u32 length)(UTF-8 bytes)` name, the inverse of [`read_name`].
#[cfg(any(feature = "std", feature = "alloc"))]
pub fn write_name(value: &str) -> Vec<u8> {
    let mut result = write_leb128_u32(value.len() as u32);
    result.extend_from_slice(value.as_bytes());
    result
}

/// Write a `(id: u8)(size: u32 LEB)` section header around `content`,
/// the inverse of [`read_section_header`] plus the following section body.
#[cfg(any(feature = "std", feature = "alloc"))]
pub fn write_section(id: u8, content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len() + 5);
    result.push(id);
    result.extend_from_slice(&write_leb128_u32(content.len() as u32));
    result.extend_from_slice(content);
    result
}
