//! Typed value store.
//!
//! Values are appended to the `.val` payload file with a deterministic
//! per-type encoding; the `.vix` index file stores one 17-byte block entry
//! per value at `value_id × 17`, so a value id resolves in O(1).

use chrono::TimeZone;

use crate::collection::Collection;
use crate::data::DataValue;
use crate::error::{ArborError, Result};
use crate::storage::block::{self, BlockEntry, BLOCK_LEN};
use crate::storage::AppendStream;

/// Type tag for `Int64` (8-byte big-endian).
pub const TAG_INT: u8 = 1;
/// Type tag for `Float64` (IEEE-754 bits, big-endian).
pub const TAG_FLOAT: u8 = 2;
/// Type tag for `String` (length-prefixed UTF-16).
pub const TAG_STRING: u8 = 3;
/// Type tag for `DateTime` (microseconds since epoch, big-endian).
pub const TAG_DATETIME: u8 = 4;

/// Append-only store of typed comparable values.
#[derive(Debug)]
pub struct ValueStore {
    values: AppendStream,
    index: AppendStream,
}

impl ValueStore {
    /// Open the `.val`/`.vix` pair of a collection.
    pub fn open(collection: &Collection) -> Result<Self> {
        Ok(Self {
            values: AppendStream::open(collection.data_path("val"))?,
            index: AppendStream::open(collection.data_path("vix"))?,
        })
    }

    /// Number of stored values.
    pub fn count(&self) -> u64 {
        self.index.len() / BLOCK_LEN as u64
    }

    /// Append a value, returning its dense value id.
    pub fn append(&self, value: &DataValue) -> Result<u64> {
        let (bytes, tag) = encode_value(value);
        let offset = self.values.append(&bytes)?;
        let entry = BlockEntry::new(offset as i64, bytes.len() as i32, tag);
        let index_offset = self.index.append(&entry.to_bytes())?;
        Ok(index_offset / BLOCK_LEN as u64)
    }

    /// Read the block entry of a value id.
    pub fn entry(&self, value_id: u64) -> Result<BlockEntry> {
        let mut buf = [0u8; BLOCK_LEN];
        self.index.read_at(value_id * BLOCK_LEN as u64, &mut buf)?;
        BlockEntry::from_bytes(&buf)
    }

    /// Read a value back by id. The inverse of [`append`](Self::append).
    pub fn read(&self, value_id: u64) -> Result<DataValue> {
        let entry = self.entry(value_id)?;
        let mut buf = vec![0u8; entry.length as usize];
        self.values.read_at(entry.offset as u64, &mut buf)?;
        decode_value(&buf, entry.type_tag)
    }

    /// Flush both files.
    pub fn flush(&self) -> Result<()> {
        self.values.flush()?;
        self.index.flush()
    }
}

fn encode_value(value: &DataValue) -> (Vec<u8>, u8) {
    match value {
        DataValue::Int64(i) => (i.to_be_bytes().to_vec(), TAG_INT),
        DataValue::Float64(f) => (f.to_bits().to_be_bytes().to_vec(), TAG_FLOAT),
        DataValue::String(s) => (block::encode_utf16(s), TAG_STRING),
        DataValue::DateTime(dt) => (dt.timestamp_micros().to_be_bytes().to_vec(), TAG_DATETIME),
    }
}

fn decode_value(bytes: &[u8], tag: u8) -> Result<DataValue> {
    match tag {
        TAG_INT => Ok(DataValue::Int64(i64::from_be_bytes(
            bytes
                .try_into()
                .map_err(|_| ArborError::misaligned("int64 value has wrong width"))?,
        ))),
        TAG_FLOAT => Ok(DataValue::Float64(f64::from_bits(u64::from_be_bytes(
            bytes
                .try_into()
                .map_err(|_| ArborError::misaligned("float64 value has wrong width"))?,
        )))),
        TAG_STRING => Ok(DataValue::String(block::decode_utf16(bytes)?)),
        TAG_DATETIME => {
            let micros = i64::from_be_bytes(
                bytes
                    .try_into()
                    .map_err(|_| ArborError::misaligned("timestamp value has wrong width"))?,
            );
            chrono::Utc
                .timestamp_micros(micros)
                .single()
                .map(DataValue::DateTime)
                .ok_or_else(|| ArborError::misaligned(format!("timestamp out of range: {micros}")))
        }
        other => Err(ArborError::misaligned(format!(
            "corrupt value type tag: {other}"
        ))),
    }
}
