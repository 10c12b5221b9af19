//! Field-name interning.
//!
//! Every field name of a collection is interned to a dense 64-bit key id.
//! The mapping is append-only: once a name gets an id, that id is never
//! reused. The persistent companion is the `.key` payload file (UTF-16
//! names) plus the `.kix` stride index; the in-memory side is a concurrent
//! map with first-writer-wins semantics.

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::collection::Collection;
use crate::error::{ArborError, Result};
use crate::storage::block::{self, BlockEntry, BLOCK_LEN};
use crate::storage::AppendStream;
use crate::store::value::TAG_STRING;

#[derive(Debug, Default)]
struct KeyTable {
    by_name: AHashMap<String, u64>,
    names: Vec<String>,
}

/// Per-collection key interning store.
///
/// Shared by write and read sessions of one collection; there is no
/// process-global state.
#[derive(Debug)]
pub struct KeyStore {
    keys: AppendStream,
    index: AppendStream,
    table: RwLock<KeyTable>,
}

impl KeyStore {
    /// Open the `.key`/`.kix` pair and load the mapping.
    pub fn open(collection: &Collection) -> Result<Self> {
        let keys = AppendStream::open(collection.data_path("key"))?;
        let index = AppendStream::open(collection.data_path("kix"))?;

        let mut table = KeyTable::default();
        let count = index.len() / BLOCK_LEN as u64;
        for key_id in 0..count {
            let mut buf = [0u8; BLOCK_LEN];
            index.read_at(key_id * BLOCK_LEN as u64, &mut buf)?;
            let entry = BlockEntry::from_bytes(&buf)?;
            let mut payload = vec![0u8; entry.length as usize];
            keys.read_at(entry.offset as u64, &mut payload)?;
            let name = block::decode_utf16(&payload)?;
            table.by_name.insert(name.clone(), key_id);
            table.names.push(name);
        }

        Ok(Self {
            keys,
            index,
            table: RwLock::new(table),
        })
    }

    /// Number of interned keys.
    pub fn count(&self) -> u64 {
        self.table.read().names.len() as u64
    }

    /// Resolve a name to its key id without interning.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        self.table.read().by_name.get(name).copied()
    }

    /// Resolve a key id back to its name.
    pub fn name(&self, key_id: u64) -> Result<String> {
        self.table
            .read()
            .names
            .get(key_id as usize)
            .cloned()
            .ok_or_else(|| ArborError::misaligned(format!("unknown key id {key_id}")))
    }

    /// Intern a name, returning its id. First writer wins; later callers
    /// observe the id the first one assigned.
    pub fn intern(&self, name: &str) -> Result<u64> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }

        let mut table = self.table.write();
        // Double-check under the write lock.
        if let Some(id) = table.by_name.get(name) {
            return Ok(*id);
        }

        let payload = block::encode_utf16(name);
        let offset = self.keys.append(&payload)?;
        let entry = BlockEntry::new(offset as i64, payload.len() as i32, TAG_STRING);
        let index_offset = self.index.append(&entry.to_bytes())?;
        let key_id = index_offset / BLOCK_LEN as u64;

        table.by_name.insert(name.to_string(), key_id);
        table.names.push(name.to_string());
        debug_assert_eq!(table.names.len() as u64, key_id + 1);
        Ok(key_id)
    }

    /// Flush both files.
    pub fn flush(&self) -> Result<()> {
        self.keys.flush()?;
        self.index.flush()
    }
}
