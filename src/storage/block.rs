//! Block and value codecs.
//!
//! Index files address payload bytes through fixed-width block entries: a
//! 17-byte `(offset: i64, length: i32, type_tag: u8)` triple in network
//! byte order. Strings are stored as length-prefixed UTF-16; integers,
//! floats and timestamps as big-endian fixed words.

use crate::error::{ArborError, Result};

/// Serialized width of a [`BlockEntry`].
pub const BLOCK_LEN: usize = 17;

/// A typed pointer into a payload file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Byte offset of the payload.
    pub offset: i64,
    /// Payload length in bytes.
    pub length: i32,
    /// Per-type tag; `0` is reserved and treated as corrupt.
    pub type_tag: u8,
}

impl BlockEntry {
    pub fn new(offset: i64, length: i32, type_tag: u8) -> Self {
        Self {
            offset,
            length,
            type_tag,
        }
    }

    /// Encode to the fixed 17-byte layout.
    pub fn to_bytes(&self) -> [u8; BLOCK_LEN] {
        let mut buf = [0u8; BLOCK_LEN];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf[12] = self.type_tag;
        buf
    }

    /// Decode from the fixed 17-byte layout.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_LEN {
            return Err(ArborError::misaligned(format!(
                "block entry truncated: {} of {BLOCK_LEN} bytes",
                buf.len()
            )));
        }
        let offset = i64::from_be_bytes(buf[0..8].try_into().unwrap());
        let length = i32::from_be_bytes(buf[8..12].try_into().unwrap());
        Ok(Self {
            offset,
            length,
            type_tag: buf[12],
        })
    }
}

/// Encode a u64 with 7-bit continuation varint encoding.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;
        if val != 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a varint u64, returning the value and the bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut read = 0;

    for &byte in bytes {
        read += 1;
        if shift >= 64 {
            return Err(ArborError::misaligned("varint overflow"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok((result, read));
        }
        shift += 7;
    }

    Err(ArborError::misaligned("incomplete varint"))
}

/// Encode a string as a u32 code-unit count followed by UTF-16BE units.
pub fn encode_utf16(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let mut bytes = Vec::with_capacity(4 + units.len() * 2);
    bytes.extend_from_slice(&(units.len() as u32).to_be_bytes());
    for unit in units {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Decode a length-prefixed UTF-16BE string.
pub fn decode_utf16(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 4 {
        return Err(ArborError::misaligned("utf-16 value truncated"));
    }
    let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    if bytes.len() < 4 + count * 2 {
        return Err(ArborError::misaligned(format!(
            "utf-16 value promises {count} units, {} bytes available",
            bytes.len() - 4
        )));
    }

    let mut units = Vec::with_capacity(count);
    for i in 0..count {
        let at = 4 + i * 2;
        units.push(u16::from_be_bytes([bytes[at], bytes[at + 1]]));
    }
    String::from_utf16(&units).map_err(|_| ArborError::misaligned("invalid utf-16 value"))
}
