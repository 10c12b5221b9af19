//! Batch versions and publication.
//!
//! Every commit produces a monotonic, time-based version id and ends by
//! writing the small `<version>.ix` batch-info file. That file's presence
//! is the publication signal: readers enumerate `.ix` files in
//! chronological order and treat a version without one as nonexistent.
//! Orphaned bytes from unpublished versions are reclaimed by
//! [`vacuum`].

use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::error::Result;

/// The batch-info manifest published as `<version>.ix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub version: i64,
    pub doc_count: u64,
    /// Payload compression; `None` means uncompressed.
    pub compression: Option<String>,
    /// The primary-key field of this batch, if any.
    pub primary_key: Option<String>,
    /// Length of the postings file at commit time.
    pub postings_offset: i64,
}

/// Produce the next version id: the current time in microseconds, pushed
/// past `last` so ids stay strictly monotonic even within one microsecond.
pub fn next_version(last: i64) -> i64 {
    let now = chrono::Utc::now().timestamp_micros();
    now.max(last + 1)
}

/// Write the batch-info file. Temp-file plus rename makes the publication
/// atomic: the `.ix` either exists completely or not at all.
pub fn write_batch_info(collection: &Collection, info: &BatchInfo) -> Result<()> {
    let path = collection.batch_path(info.version);
    let tmp = path.with_extension("ix.tmp");
    std::fs::write(&tmp, serde_json::to_vec(info)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Read one published batch-info file.
pub fn read_batch_info(collection: &Collection, version: i64) -> Result<BatchInfo> {
    let bytes = std::fs::read(collection.batch_path(version))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Enumerate published versions in chronological (ascending) order.
pub fn published_versions(collection: &Collection) -> Result<Vec<i64>> {
    let mut versions = Vec::new();
    for entry in std::fs::read_dir(collection.dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(stem) = name.strip_suffix(".ix") {
            if let Ok(version) = stem.parse::<i64>() {
                versions.push(version);
            }
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// A file belongs to a version iff it is one of the per-version index
/// files; the collection-wide payload files (`.val`, `.pos`, …) are also
/// numerically prefixed and must never look like batch leftovers.
fn version_prefix(name: &str) -> Option<i64> {
    if !(name.ends_with(".tri") || name.ends_with(".ix1") || name.ends_with(".ixp1")) {
        return None;
    }
    let digits: String = name.chars().take_while(|ch| ch.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match name.as_bytes().get(digits.len()) {
        Some(b'-') | Some(b'.') => digits.parse().ok(),
        _ => None,
    }
}

/// Bytes occupied by version-prefixed files whose version was never
/// published (a crash between flush and commit leaves these behind).
pub fn dead_bytes(collection: &Collection) -> Result<u64> {
    let published: std::collections::HashSet<i64> =
        published_versions(collection)?.into_iter().collect();
    let mut dead = 0;
    for entry in std::fs::read_dir(collection.dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".ix") || name.ends_with(".ix.tmp") {
            continue;
        }
        if let Some(version) = version_prefix(name) {
            if !published.contains(&version) {
                dead += entry.metadata()?.len();
            }
        }
    }
    Ok(dead)
}

/// Delete the index files of unpublished versions. Returns the bytes
/// reclaimed.
pub fn vacuum(collection: &Collection) -> Result<u64> {
    let published: std::collections::HashSet<i64> =
        published_versions(collection)?.into_iter().collect();
    let mut reclaimed = 0;
    for entry in std::fs::read_dir(collection.dir())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".ix") || name.ends_with(".ix.tmp") {
            continue;
        }
        if let Some(version) = version_prefix(name) {
            if !published.contains(&version) {
                reclaimed += entry.metadata()?.len();
                std::fs::remove_file(entry.path())?;
            }
        }
    }
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_is_monotonic() {
        let first = next_version(0);
        let second = next_version(first);
        assert!(second > first);
        // Even against a future timestamp.
        assert_eq!(next_version(i64::MAX - 1), i64::MAX);
    }

    #[test]
    fn test_publication_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open(dir.path(), "versions").unwrap();

        let info = BatchInfo {
            version: 42,
            doc_count: 6,
            compression: None,
            primary_key: Some("_id".to_string()),
            postings_offset: 1024,
        };
        write_batch_info(&collection, &info).unwrap();

        let read = read_batch_info(&collection, 42).unwrap();
        assert_eq!(read.doc_count, 6);
        assert_eq!(read.primary_key.as_deref(), Some("_id"));
        assert_eq!(published_versions(&collection).unwrap(), vec![42]);
    }

    #[test]
    fn test_enumeration_is_chronological() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open(dir.path(), "versions").unwrap();

        for version in [30, 10, 20] {
            let info = BatchInfo {
                version,
                doc_count: 0,
                compression: None,
                primary_key: None,
                postings_offset: 0,
            };
            write_batch_info(&collection, &info).unwrap();
        }
        assert_eq!(published_versions(&collection).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_vacuum_reclaims_unpublished() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open(dir.path(), "versions").unwrap();

        // Version 10 is published, 20 is not.
        write_batch_info(
            &collection,
            &BatchInfo {
                version: 10,
                doc_count: 0,
                compression: None,
                primary_key: None,
                postings_offset: 0,
            },
        )
        .unwrap();
        std::fs::write(collection.trie_path(10, "title"), b"published").unwrap();
        std::fs::write(collection.trie_path(20, "title"), b"orphaned").unwrap();
        std::fs::write(collection.vtree_path(20, 3), b"orphaned too").unwrap();

        assert_eq!(dead_bytes(&collection).unwrap(), 20);
        let reclaimed = vacuum(&collection).unwrap();
        assert_eq!(reclaimed, 20);
        assert!(collection.trie_path(10, "title").exists());
        assert!(!collection.trie_path(20, "title").exists());
        assert!(!collection.vtree_path(20, 3).exists());
    }
}
