// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-level primitives for the runtime type info blob.
//!
//! Little-endian throughout. Writers append to a `Vec<u8>`; readers carry
//! an explicit offset cursor and fail with [`WireError::UnexpectedEof`]
//! instead of panicking on short input.

use std::fmt;

// ============================================================================
// WireError
// ============================================================================

/// Decoding and compression failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Blob does not start with the expected magic.
    BadMagic,
    /// Header carries a format version this build cannot read.
    UnsupportedVersion(u16),
    /// Input ended inside a record.
    UnexpectedEof,
    /// Structurally valid bytes with invalid content.
    InvalidEncoding(String),
    /// Unknown variant discriminator.
    UnknownTag { context: &'static str, tag: u8 },
    Compression(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::BadMagic => write!(f, "bad magic"),
            WireError::UnsupportedVersion(v) => write!(f, "unsupported format version {}", v),
            WireError::UnexpectedEof => write!(f, "unexpected end of input"),
            WireError::InvalidEncoding(msg) => write!(f, "invalid encoding: {}", msg),
            WireError::UnknownTag { context, tag } => {
                write!(f, "unknown {} tag {:#04x}", context, tag)
            }
            WireError::Compression(msg) => write!(f, "compression failure: {}", msg),
        }
    }
}

impl std::error::Error for WireError {}

// ============================================================================
// Writers
// ============================================================================

pub fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(v as u8);
}

pub fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// u32 byte length followed by UTF-8 bytes, no terminator.
pub fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

/// Presence flag followed by the string when present.
pub fn put_opt_string(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            put_bool(buf, true);
            put_string(buf, s);
        }
        None => put_bool(buf, false),
    }
}

/// u32 byte length followed by raw bytes.
pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

// ============================================================================
// Readers
// ============================================================================

fn take<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], WireError> {
    let end = offset.checked_add(len).ok_or(WireError::UnexpectedEof)?;
    if end > buf.len() {
        return Err(WireError::UnexpectedEof);
    }
    let slice = &buf[*offset..end];
    *offset = end;
    Ok(slice)
}

pub fn get_u8(buf: &[u8], offset: &mut usize) -> Result<u8, WireError> {
    Ok(take(buf, offset, 1)?[0])
}

pub fn get_bool(buf: &[u8], offset: &mut usize) -> Result<bool, WireError> {
    match get_u8(buf, offset)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(WireError::UnknownTag {
            context: "bool",
            tag: other,
        }),
    }
}

pub fn get_u16(buf: &[u8], offset: &mut usize) -> Result<u16, WireError> {
    let bytes = take(buf, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn get_u32(buf: &[u8], offset: &mut usize) -> Result<u32, WireError> {
    let bytes = take(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn get_u64(buf: &[u8], offset: &mut usize) -> Result<u64, WireError> {
    let bytes = take(buf, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}

pub fn get_i64(buf: &[u8], offset: &mut usize) -> Result<i64, WireError> {
    Ok(get_u64(buf, offset)? as i64)
}

pub fn get_f64(buf: &[u8], offset: &mut usize) -> Result<f64, WireError> {
    Ok(f64::from_bits(get_u64(buf, offset)?))
}

pub fn get_string(buf: &[u8], offset: &mut usize) -> Result<String, WireError> {
    let len = get_u32(buf, offset)? as usize;
    let bytes = take(buf, offset, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| WireError::InvalidEncoding("string is not UTF-8".to_string()))
}

pub fn get_opt_string(buf: &[u8], offset: &mut usize) -> Result<Option<String>, WireError> {
    if get_bool(buf, offset)? {
        Ok(Some(get_string(buf, offset)?))
    } else {
        Ok(None)
    }
}

pub fn get_bytes<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a [u8], WireError> {
    let len = get_u32(buf, offset)? as usize;
    take(buf, offset, len)
}
