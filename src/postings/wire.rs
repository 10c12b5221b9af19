//! Postings wire protocol.
//!
//! The postings side of the engine is addressable over a byte protocol so
//! it can live behind a remote service; the frames below are the
//! persistence boundary and are normative.
//!
//! Bulk-write request:
//!
//! ```text
//! [i32: count]
//! [i32: length]  × count     bytes in each list body
//! [i64: offset]  × count     existing head offset, or -1 to create
//! [bytes: body]  × count     length[i] bytes of u64 doc ids
//! ```
//!
//! Write response: `[i32: count] [i64: offset] × count`.
//!
//! Read-reduce request: `[i32: count]` then per cursor
//! `[i64: head offset] [u8: op] [f32: score]`.
//!
//! Scored response (read and reduce): `[i64: total]` then repeated
//! `[u64: doc id] [f32: score]`.
//!
//! All words are big-endian; f32 travels as its IEEE-754 bit pattern.

use crate::error::{ArborError, Result};
use crate::postings::reduce::{self, BoolOp, ReduceCursor};
use crate::postings::store::PostingsStore;

/// Decoded bulk-write request: `(head offset or -1, doc ids)` per list.
pub type WriteRequest = Vec<(i64, Vec<u64>)>;

/// Encode a bulk-write request frame.
pub fn encode_write_request(lists: &WriteRequest) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(lists.len() as i32).to_be_bytes());
    for (_, doc_ids) in lists {
        out.extend_from_slice(&((doc_ids.len() * 8) as i32).to_be_bytes());
    }
    for (offset, _) in lists {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    for (_, doc_ids) in lists {
        for doc_id in doc_ids {
            out.extend_from_slice(&doc_id.to_be_bytes());
        }
    }
    out
}

/// Decode a bulk-write request frame.
pub fn decode_write_request(bytes: &[u8]) -> Result<WriteRequest> {
    let mut at = 0;
    let count = read_i32(bytes, &mut at)? as usize;

    let mut lengths = Vec::with_capacity(count);
    for _ in 0..count {
        let length = read_i32(bytes, &mut at)?;
        if length < 0 || length % 8 != 0 {
            return Err(ArborError::misaligned(format!(
                "postings list body length {length} is not a doc-id multiple"
            )));
        }
        lengths.push(length as usize);
    }

    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(read_i64(bytes, &mut at)?);
    }

    let mut lists = Vec::with_capacity(count);
    for (offset, length) in offsets.into_iter().zip(lengths) {
        let mut doc_ids = Vec::with_capacity(length / 8);
        for _ in 0..length / 8 {
            doc_ids.push(read_u64(bytes, &mut at)?);
        }
        lists.push((offset, doc_ids));
    }

    if at != bytes.len() {
        return Err(ArborError::misaligned(format!(
            "write frame has {} trailing bytes",
            bytes.len() - at
        )));
    }
    Ok(lists)
}

/// Encode a write response: the head offset per list.
pub fn encode_write_response(offsets: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(offsets.len() as i32).to_be_bytes());
    for offset in offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out
}

/// Decode a write response.
pub fn decode_write_response(bytes: &[u8]) -> Result<Vec<i64>> {
    let mut at = 0;
    let count = read_i32(bytes, &mut at)? as usize;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(read_i64(bytes, &mut at)?);
    }
    Ok(offsets)
}

/// Encode a read-reduce request frame.
pub fn encode_reduce_request(cursors: &[ReduceCursor]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(cursors.len() as i32).to_be_bytes());
    for cursor in cursors {
        out.extend_from_slice(&cursor.address.to_be_bytes());
        out.push(cursor.op as u8);
        out.extend_from_slice(&cursor.score.to_bits().to_be_bytes());
    }
    out
}

/// Decode a read-reduce request frame.
pub fn decode_reduce_request(bytes: &[u8]) -> Result<Vec<ReduceCursor>> {
    let mut at = 0;
    let count = read_i32(bytes, &mut at)? as usize;
    let mut cursors = Vec::with_capacity(count);
    for _ in 0..count {
        let address = read_i64(bytes, &mut at)?;
        let tag = read_u8(bytes, &mut at)?;
        let op = BoolOp::from_tag(tag)
            .ok_or_else(|| ArborError::misaligned(format!("unknown reduce op tag {tag}")))?;
        let score = f32::from_bits(read_u32(bytes, &mut at)?);
        cursors.push(ReduceCursor { address, op, score });
    }
    Ok(cursors)
}

/// Encode a scored response: total count then `(doc id, score)` pairs.
pub fn encode_scored_response(total: i64, pairs: &[(u64, f32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + pairs.len() * 12);
    out.extend_from_slice(&total.to_be_bytes());
    for (doc_id, score) in pairs {
        out.extend_from_slice(&doc_id.to_be_bytes());
        out.extend_from_slice(&score.to_bits().to_be_bytes());
    }
    out
}

/// Decode a scored response.
pub fn decode_scored_response(bytes: &[u8]) -> Result<(i64, Vec<(u64, f32)>)> {
    let mut at = 0;
    let total = read_i64(bytes, &mut at)?;
    let mut pairs = Vec::new();
    while at < bytes.len() {
        let doc_id = read_u64(bytes, &mut at)?;
        let score = f32::from_bits(read_u32(bytes, &mut at)?);
        pairs.push((doc_id, score));
    }
    Ok((total, pairs))
}

/// The frame-level entry points of the postings service.
///
/// A remote deployment moves these behind a socket; embedded use calls
/// them directly.
#[derive(Debug)]
pub struct PostingsService<'a> {
    store: &'a PostingsStore,
}

impl<'a> PostingsService<'a> {
    pub fn new(store: &'a PostingsStore) -> Self {
        Self { store }
    }

    /// Handle a bulk-write frame, returning the write response frame.
    pub fn handle_write(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let lists = decode_write_request(frame)?;
        let offsets = self.store.write_many(&lists)?;
        Ok(encode_write_response(&offsets))
    }

    /// Handle a read-reduce frame, returning the scored response frame.
    pub fn handle_reduce(&self, frame: &[u8], skip: usize, take: usize) -> Result<Vec<u8>> {
        let cursors = decode_reduce_request(frame)?;
        let (total, pairs) = reduce::reduce(self.store, &cursors, skip, take)?;
        Ok(encode_scored_response(total, &pairs))
    }
}

fn read_u8(bytes: &[u8], at: &mut usize) -> Result<u8> {
    let value = *bytes
        .get(*at)
        .ok_or_else(|| ArborError::misaligned("frame truncated"))?;
    *at += 1;
    Ok(value)
}

fn read_i32(bytes: &[u8], at: &mut usize) -> Result<i32> {
    let end = *at + 4;
    let slice = bytes
        .get(*at..end)
        .ok_or_else(|| ArborError::misaligned("frame truncated"))?;
    *at = end;
    Ok(i32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], at: &mut usize) -> Result<u32> {
    let end = *at + 4;
    let slice = bytes
        .get(*at..end)
        .ok_or_else(|| ArborError::misaligned("frame truncated"))?;
    *at = end;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], at: &mut usize) -> Result<i64> {
    let end = *at + 8;
    let slice = bytes
        .get(*at..end)
        .ok_or_else(|| ArborError::misaligned("frame truncated"))?;
    *at = end;
    Ok(i64::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], at: &mut usize) -> Result<u64> {
    let end = *at + 8;
    let slice = bytes
        .get(*at..end)
        .ok_or_else(|| ArborError::misaligned("frame truncated"))?;
    *at = end;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;

    #[test]
    fn test_write_request_round_trip() {
        let request: WriteRequest = vec![(-1, vec![1, 2, 3]), (4096, vec![9])];
        let frame = encode_write_request(&request);
        assert_eq!(decode_write_request(&frame).unwrap(), request);
    }

    #[test]
    fn test_reduce_request_round_trip() {
        let cursors = vec![
            ReduceCursor {
                address: 24,
                op: BoolOp::And,
                score: 1.5,
            },
            ReduceCursor {
                address: 96,
                op: BoolOp::Not,
                score: 0.0,
            },
        ];
        let frame = encode_reduce_request(&cursors);
        let decoded = decode_reduce_request(&frame).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].address, 24);
        assert_eq!(decoded[0].op, BoolOp::And);
        assert_eq!(decoded[0].score, 1.5);
        assert_eq!(decoded[1].op, BoolOp::Not);
    }

    #[test]
    fn test_scored_response_round_trip() {
        let pairs = vec![(3u64, 2.0f32), (4, 1.0)];
        let frame = encode_scored_response(7, &pairs);
        assert_eq!(decode_scored_response(&frame).unwrap(), (7, pairs));
    }

    #[test]
    fn test_truncated_frame() {
        let request: WriteRequest = vec![(-1, vec![1, 2, 3])];
        let mut frame = encode_write_request(&request);
        frame.truncate(frame.len() - 3);
        assert!(decode_write_request(&frame).is_err());
    }

    #[test]
    fn test_service_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open(dir.path(), "wire").unwrap();
        let store = PostingsStore::open(&collection).unwrap();
        let service = PostingsService::new(&store);

        // Create two lists through the wire.
        let write = encode_write_request(&vec![(-1, vec![3, 4, 5]), (-1, vec![5])]);
        let response = service.handle_write(&write).unwrap();
        let offsets = decode_write_response(&response).unwrap();
        assert_eq!(offsets.len(), 2);

        // Reduce: AND the first, NOT the second.
        let cursors = vec![
            ReduceCursor {
                address: offsets[0],
                op: BoolOp::And,
                score: 1.0,
            },
            ReduceCursor {
                address: offsets[1],
                op: BoolOp::Not,
                score: 0.0,
            },
        ];
        let frame = encode_reduce_request(&cursors);
        let response = service.handle_reduce(&frame, 0, 10).unwrap();
        let (total, pairs) = decode_scored_response(&response).unwrap();

        assert_eq!(total, 2);
        let doc_ids: Vec<u64> = pairs.iter().map(|(d, _)| *d).collect();
        assert_eq!(doc_ids, vec![3, 4]);
    }
}
