//! Collection naming, file layout and the writer lock.
//!
//! A collection is identified by a name and the 64-bit hash of that name
//! (the collection id). Every file belonging to one collection carries the
//! id as prefix, all rooted at the configured data directory:
//!
//! ```text
//! <id>.val  <id>.key  <id>.docs        payload files
//! <id>.vix  <id>.kix  <id>.dix        fixed-stride index files
//! <id>.pos                            postings pages
//! <id>.vec                            vectors (vector-index variant)
//! <id>.del                            deleted doc-id set
//! <version>-<field>.tri               per-field serialized trie
//! <version>.<key_id>.ix1 / .ixp1      serialized vector tree + addresses
//! <version>.ix                        batch-info (publication marker)
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{ArborError, Result};

/// Stable 64-bit FNV-1a hash used to derive a collection id from its name.
///
/// The id names files on disk, so it must be identical across processes
/// and runs.
pub fn name_hash(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for byte in name.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A named collection rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    id: u64,
    dir: PathBuf,
}

impl Collection {
    /// Create a handle for `name` under `data_dir`, creating the directory
    /// if it does not exist yet.
    pub fn open(data_dir: impl Into<PathBuf>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(ArborError::invalid_argument("collection name is empty"));
        }
        let dir = data_dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            id: name_hash(name),
            dir,
        })
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 64-bit collection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a collection-wide payload or index file, e.g. `data("val")`.
    pub fn data_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{extension}", self.id))
    }

    /// Path of a per-field serialized trie for one version.
    pub fn trie_path(&self, version: i64, field: &str) -> PathBuf {
        self.dir.join(format!("{version}-{field}.tri"))
    }

    /// Path of the serialized vector tree for one version and key.
    pub fn vtree_path(&self, version: i64, key_id: u64) -> PathBuf {
        self.dir.join(format!("{version}.{key_id}.ix1"))
    }

    /// Path of the vector tree postings-address stream for one version and key.
    pub fn vtree_postings_path(&self, version: i64, key_id: u64) -> PathBuf {
        self.dir.join(format!("{version}.{key_id}.ixp1"))
    }

    /// Path of the batch-info publication marker for one version.
    pub fn batch_path(&self, version: i64) -> PathBuf {
        self.dir.join(format!("{version}.ix"))
    }

    /// Path of the writer lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.id))
    }
}

/// Exclusive writer lock over a collection.
///
/// Held for the lifetime of a write session; released on drop. A second
/// writer fails immediately with `ConflictingWrite`.
#[derive(Debug)]
pub struct CollectionLock {
    file: File,
}

impl CollectionLock {
    /// Acquire the exclusive lock, failing fast if it is already held.
    pub fn acquire(collection: &Collection) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(collection.lock_path())?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                return Err(ArborError::conflicting_write(format!(
                    "collection '{}' is locked by another writer",
                    collection.name()
                )));
            }
        }

        Ok(Self { file })
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_hash_stable() {
        assert_eq!(name_hash("movies"), name_hash("movies"));
        assert_ne!(name_hash("movies"), name_hash("books"));
    }

    #[test]
    fn test_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let col = Collection::open(dir.path(), "movies").unwrap();
        let id = col.id();

        assert!(col.data_path("val").ends_with(format!("{id}.val")));
        assert!(col.trie_path(42, "title").ends_with("42-title.tri"));
        assert!(col.vtree_path(42, 7).ends_with("42.7.ix1"));
        assert!(col.vtree_postings_path(42, 7).ends_with("42.7.ixp1"));
        assert!(col.batch_path(42).ends_with("42.ix"));
    }

    #[test]
    fn test_lock_excludes_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let col = Collection::open(dir.path(), "movies").unwrap();

        let lock = CollectionLock::acquire(&col).unwrap();
        assert!(matches!(
            CollectionLock::acquire(&col),
            Err(ArborError::ConflictingWrite(_))
        ));
        drop(lock);

        // Released on drop; a new writer may acquire.
        let _lock = CollectionLock::acquire(&col).unwrap();
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Collection::open(dir.path(), "").is_err());
    }
}
