//! Vector tree serialization.
//!
//! ## File formats
//!
//! `.ix1` is a preorder record stream prefixed by a `u32` dimension header:
//!
//! ```text
//! [u32: dimension]
//! [i64: vector offset] [i64: postings offset] [i32: postings length] [u8: flags]
//! ```
//!
//! Flags: bit 0 = left child present, bit 1 = right child present. Vectors
//! live in the collection-wide `.vec` file as big-endian f32 words and are
//! referenced by byte offset, keeping the index file small.
//!
//! `.ixp1` mirrors the postings addresses in the same preorder as a plain
//! `(i64, i32)` stream. It is produced during incremental write so a
//! partially rebuilt tree can re-associate addresses without reparsing
//! `.ix1`; cold load never consults it.

use std::path::Path;

use crate::error::{ArborError, Result};
use crate::index::vector::Vector;
use crate::index::vtree::{VectorNode, VectorTree};
use crate::postings::PostingsAddress;
use crate::storage::AppendStream;

const FLAG_LEFT: u8 = 1;
const FLAG_RIGHT: u8 = 1 << 1;

/// Record width after the header: vector offset + postings address + flags.
const RECORD_LEN: usize = 8 + 8 + 4 + 1;

/// Serialize a tree: vectors into `vec_stream`, records into `ix1_path`,
/// the postings-address stream into `ixp_path`.
///
/// Postings addresses must already be attached to every node.
pub fn write_vtree(
    tree: &VectorTree,
    ix1_path: &Path,
    ixp_path: &Path,
    vec_stream: &AppendStream,
) -> Result<()> {
    let Some(root) = tree.root() else {
        std::fs::write(ix1_path, [])?;
        std::fs::write(ixp_path, [])?;
        return Ok(());
    };

    let dimension = root.vector.dimension() as u32;
    let mut records = Vec::new();
    records.extend_from_slice(&dimension.to_be_bytes());
    let mut addresses = Vec::new();

    encode_node(root, vec_stream, &mut records, &mut addresses)?;

    std::fs::write(ix1_path, &records)?;
    std::fs::write(ixp_path, &addresses)?;
    Ok(())
}

fn encode_node(
    node: &VectorNode,
    vec_stream: &AppendStream,
    records: &mut Vec<u8>,
    addresses: &mut Vec<u8>,
) -> Result<()> {
    let postings = node.postings.ok_or_else(|| {
        ArborError::internal("vector node serialized before postings were attached")
    })?;

    let mut vector_bytes = Vec::with_capacity(node.vector.dimension() * 4);
    for value in node.vector.values() {
        vector_bytes.extend_from_slice(&value.to_be_bytes());
    }
    let vector_offset = vec_stream.append(&vector_bytes)? as i64;

    let mut flags = 0u8;
    if node.left.is_some() {
        flags |= FLAG_LEFT;
    }
    if node.right.is_some() {
        flags |= FLAG_RIGHT;
    }

    records.extend_from_slice(&vector_offset.to_be_bytes());
    records.extend_from_slice(&postings.offset.to_be_bytes());
    records.extend_from_slice(&postings.length.to_be_bytes());
    records.push(flags);

    addresses.extend_from_slice(&postings.offset.to_be_bytes());
    addresses.extend_from_slice(&postings.length.to_be_bytes());

    if let Some(left) = node.left.as_deref() {
        encode_node(left, vec_stream, records, addresses)?;
    }
    if let Some(right) = node.right.as_deref() {
        encode_node(right, vec_stream, records, addresses)?;
    }
    Ok(())
}

/// A loaded read-side vector tree node.
#[derive(Debug)]
struct DiskNode {
    vector: Vector,
    postings: PostingsAddress,
    left: Option<Box<DiskNode>>,
    right: Option<Box<DiskNode>>,
}

/// Read-side handle over one serialized vector tree.
///
/// Cold load uses `.ix1` plus the `.vec` vector file only.
#[derive(Debug)]
pub struct VTreeReader {
    root: Option<Box<DiskNode>>,
    identical_angle: f32,
    fold_angle: f32,
}

impl VTreeReader {
    /// Load a serialized tree; an empty file yields an empty reader.
    pub fn load(
        ix1_path: &Path,
        vec_stream: &AppendStream,
        identical_angle: f32,
        fold_angle: f32,
    ) -> Result<Self> {
        let bytes = std::fs::read(ix1_path)?;
        if bytes.is_empty() {
            return Ok(Self {
                root: None,
                identical_angle,
                fold_angle,
            });
        }
        if bytes.len() < 4 {
            return Err(ArborError::misaligned("vector index header truncated"));
        }

        let dimension = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut at = 4;
        let root = parse_node(&bytes, &mut at, dimension, vec_stream)?;
        if at != bytes.len() {
            return Err(ArborError::misaligned(format!(
                "vector index has {} trailing bytes",
                bytes.len() - at
            )));
        }

        Ok(Self {
            root: Some(root),
            identical_angle,
            fold_angle,
        })
    }

    /// Mirror the write-side descent, remembering the best-angle node.
    pub fn closest_match(&self, query: &Vector) -> Option<(PostingsAddress, f32)> {
        let mut cursor = self.root.as_deref()?;
        let mut best_angle = f32::MIN;
        let mut best = cursor;

        loop {
            let angle = Vector::cos_angle(query, &cursor.vector);
            if angle > best_angle {
                best_angle = angle;
                best = cursor;
            }
            if angle >= self.identical_angle {
                break;
            }
            let descend = angle >= self.fold_angle;
            let go_left = if descend { angle > 0.0 } else { angle <= 0.0 };
            let next = if go_left {
                cursor.left.as_deref()
            } else {
                cursor.right.as_deref()
            };
            match next {
                Some(node) => cursor = node,
                None => break,
            }
        }

        Some((best.postings, best_angle))
    }
}

fn parse_node(
    bytes: &[u8],
    at: &mut usize,
    dimension: usize,
    vec_stream: &AppendStream,
) -> Result<Box<DiskNode>> {
    if *at + RECORD_LEN > bytes.len() {
        return Err(ArborError::misaligned("vector index record truncated"));
    }

    let vector_offset = i64::from_be_bytes(bytes[*at..*at + 8].try_into().unwrap());
    let postings_offset = i64::from_be_bytes(bytes[*at + 8..*at + 16].try_into().unwrap());
    let postings_length = i32::from_be_bytes(bytes[*at + 16..*at + 20].try_into().unwrap());
    let flags = bytes[*at + 20];
    *at += RECORD_LEN;

    let mut vector_bytes = vec![0u8; dimension * 4];
    vec_stream.read_at(vector_offset as u64, &mut vector_bytes)?;
    let values: Vec<f32> = vector_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_be_bytes(chunk.try_into().unwrap()))
        .collect();

    let left = if flags & FLAG_LEFT != 0 {
        Some(parse_node(bytes, at, dimension, vec_stream)?)
    } else {
        None
    };
    let right = if flags & FLAG_RIGHT != 0 {
        Some(parse_node(bytes, at, dimension, vec_stream)?)
    } else {
        None
    };

    Ok(Box::new(DiskNode {
        vector: Vector::new(values),
        postings: PostingsAddress::new(postings_offset, postings_length),
        left,
        right,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTICAL: f32 = 0.999;
    const FOLD: f32 = 0.55;

    fn make_serialized(
        dir: &tempfile::TempDir,
        vectors: &[(Vec<f32>, u64)],
    ) -> (AppendStream, std::path::PathBuf, std::path::PathBuf) {
        let mut tree = VectorTree::new(IDENTICAL, FOLD);
        for (values, doc_id) in vectors {
            tree.insert(Vector::unit(values.clone()), *doc_id);
        }

        let addresses: Vec<PostingsAddress> = (0..tree.node_count())
            .map(|i| PostingsAddress::new(i as i64 * 100 + 24, 24))
            .collect();
        tree.attach_postings(&addresses);

        let vec_stream = AppendStream::open(dir.path().join("c.vec")).unwrap();
        let ix1 = dir.path().join("1.0.ix1");
        let ixp = dir.path().join("1.0.ixp1");
        write_vtree(&tree, &ix1, &ixp, &vec_stream).unwrap();
        (vec_stream, ix1, ixp)
    }

    #[test]
    fn test_round_trip_closest_match() {
        let dir = tempfile::tempdir().unwrap();
        let (vec_stream, ix1, _ixp) = make_serialized(
            &dir,
            &[
                (vec![1.0, 0.0, 0.0], 1),
                (vec![0.0, 1.0, 0.0], 2),
                (vec![0.0, 0.0, 1.0], 3),
            ],
        );

        let reader = VTreeReader::load(&ix1, &vec_stream, IDENTICAL, FOLD).unwrap();
        let (postings, score) = reader
            .closest_match(&Vector::unit(vec![0.0, 1.0, 0.01]))
            .unwrap();
        assert!(score > 0.9);
        // The second inserted node got the second preorder slot under root.
        assert!(postings.offset > 0);
    }

    #[test]
    fn test_ixp1_mirrors_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let (_vec_stream, _ix1, ixp) =
            make_serialized(&dir, &[(vec![1.0, 0.0], 1), (vec![0.0, 1.0], 2)]);

        let bytes = std::fs::read(&ixp).unwrap();
        assert_eq!(bytes.len(), 2 * 12);
        let first_offset = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(first_offset, 24);
    }

    #[test]
    fn test_empty_tree_serializes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tree = VectorTree::new(IDENTICAL, FOLD);
        let vec_stream = AppendStream::open(dir.path().join("c.vec")).unwrap();
        let ix1 = dir.path().join("1.0.ix1");
        let ixp = dir.path().join("1.0.ixp1");
        write_vtree(&tree, &ix1, &ixp, &vec_stream).unwrap();

        let reader = VTreeReader::load(&ix1, &vec_stream, IDENTICAL, FOLD).unwrap();
        assert!(reader.closest_match(&Vector::unit(vec![1.0])).is_none());
    }
}
