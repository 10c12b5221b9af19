//! Document map store and the deleted-id set.
//!
//! Each document's map is the ordered list of `(key_id, value_id)` pairs
//! in input field order, varint-encoded in the `.docs` payload file. The
//! `.dix` index stores `(offset: i64, length: i32)` at `doc_id × 12` so a
//! doc id resolves in O(1). Deleted doc ids live in a small `.del` JSON
//! set consulted on every read.

use ahash::AHashSet;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::error::{ArborError, Result};
use crate::storage::block::{decode_varint, encode_varint};
use crate::storage::AppendStream;

/// Serialized width of a `.dix` entry: offset i64 + length i32.
const DIX_STRIDE: u64 = 12;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeletedManifest {
    doc_ids: Vec<u64>,
}

/// Append-only store of document maps.
#[derive(Debug)]
pub struct DocStore {
    docs: AppendStream,
    index: AppendStream,
    deleted: RwLock<AHashSet<u64>>,
    deleted_path: std::path::PathBuf,
}

impl DocStore {
    /// Open the `.docs`/`.dix` pair and load the deleted set.
    pub fn open(collection: &Collection) -> Result<Self> {
        let deleted_path = collection.data_path("del");
        let deleted = if deleted_path.exists() {
            let bytes = std::fs::read(&deleted_path)?;
            let manifest: DeletedManifest = serde_json::from_slice(&bytes)?;
            manifest.doc_ids.into_iter().collect()
        } else {
            AHashSet::new()
        };

        Ok(Self {
            docs: AppendStream::open(collection.data_path("docs"))?,
            index: AppendStream::open(collection.data_path("dix"))?,
            deleted: RwLock::new(deleted),
            deleted_path,
        })
    }

    /// Number of stored documents (deleted ones included).
    pub fn count(&self) -> u64 {
        self.index.len() / DIX_STRIDE
    }

    /// Append a document map, returning the doc id it landed at.
    ///
    /// Doc ids are dense: the id is the current `.dix` slot count, so the
    /// caller's monotonically assigned id and the stored position agree.
    pub fn append(&self, doc_map: &[(u64, u64)]) -> Result<u64> {
        let mut payload = encode_varint(doc_map.len() as u64);
        for (key_id, value_id) in doc_map {
            payload.extend_from_slice(&encode_varint(*key_id));
            payload.extend_from_slice(&encode_varint(*value_id));
        }

        let offset = self.docs.append(&payload)?;
        let mut entry = [0u8; DIX_STRIDE as usize];
        entry[0..8].copy_from_slice(&(offset as i64).to_be_bytes());
        entry[8..12].copy_from_slice(&(payload.len() as i32).to_be_bytes());
        let index_offset = self.index.append(&entry)?;
        Ok(index_offset / DIX_STRIDE)
    }

    /// Read a document map back. Returns `None` when the doc id is deleted.
    pub fn read(&self, doc_id: u64) -> Result<Option<Vec<(u64, u64)>>> {
        if self.deleted.read().contains(&doc_id) {
            return Ok(None);
        }
        if doc_id >= self.count() {
            return Err(ArborError::misaligned(format!(
                "doc id {doc_id} beyond doc index ({} docs)",
                self.count()
            )));
        }

        let mut entry = [0u8; DIX_STRIDE as usize];
        self.index.read_at(doc_id * DIX_STRIDE, &mut entry)?;
        let offset = i64::from_be_bytes(entry[0..8].try_into().unwrap());
        let length = i32::from_be_bytes(entry[8..12].try_into().unwrap());

        let mut payload = vec![0u8; length as usize];
        self.docs.read_at(offset as u64, &mut payload)?;

        let (count, mut at) = decode_varint(&payload)?;
        let mut doc_map = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (key_id, read) = decode_varint(&payload[at..])?;
            at += read;
            let (value_id, read) = decode_varint(&payload[at..])?;
            at += read;
            doc_map.push((key_id, value_id));
        }
        Ok(Some(doc_map))
    }

    /// Whether a doc id is in the deleted set.
    pub fn is_deleted(&self, doc_id: u64) -> bool {
        self.deleted.read().contains(&doc_id)
    }

    /// Add a doc id to the deleted set and persist it atomically.
    pub fn delete(&self, doc_id: u64) -> Result<()> {
        {
            let mut deleted = self.deleted.write();
            if !deleted.insert(doc_id) {
                return Ok(());
            }
        }
        self.persist_deleted()
    }

    fn persist_deleted(&self) -> Result<()> {
        let mut doc_ids: Vec<u64> = self.deleted.read().iter().copied().collect();
        doc_ids.sort_unstable();
        let manifest = DeletedManifest { doc_ids };
        let bytes = serde_json::to_vec(&manifest)?;

        let tmp = self.deleted_path.with_extension("del.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.deleted_path)?;
        Ok(())
    }

    /// Flush both files.
    pub fn flush(&self) -> Result<()> {
        self.docs.flush()?;
        self.index.flush()
    }
}
