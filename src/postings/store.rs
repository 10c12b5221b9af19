//! The paged postings file.
//!
//! Each term's doc ids form a singly-linked list of pages inside the
//! collection's `.pos` file. Every page carries a fixed 24-byte header:
//!
//! ```text
//! [i64: count] [i64: next page offset, -1 = tail] [i64: last page offset]
//! ```
//!
//! `last` is meaningful on the head page only, where it always names the
//! page whose `next` is -1; continuation pages are written with `last` =
//! -1. The body is `count` big-endian u64 doc ids. Appending never
//! rewrites a page body, only the two pointer words, so a reader chasing
//! `next` can run concurrently with appends.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};

use crate::collection::Collection;
use crate::error::{ArborError, Result};
use crate::postings::PostingsAddress;
use crate::storage::AppendStream;

/// Page header width: count + next + last.
const HEADER_LEN: u64 = 24;

#[derive(Debug, Clone, Copy)]
struct PageHeader {
    count: i64,
    next: i64,
    last: i64,
}

/// Per-collection postings store with a memo cache of resolved lists.
#[derive(Debug)]
pub struct PostingsStore {
    stream: AppendStream,
    /// Serializes the multi-step append sequences; single appends to the
    /// stream are already safe, but tail patching is not.
    write_lock: Mutex<()>,
    cache: RwLock<AHashMap<i64, Arc<Vec<u64>>>>,
}

impl PostingsStore {
    /// Open the `.pos` file of a collection.
    pub fn open(collection: &Collection) -> Result<Self> {
        Ok(Self {
            stream: AppendStream::open(collection.data_path("pos"))?,
            write_lock: Mutex::new(()),
            cache: RwLock::new(AHashMap::new()),
        })
    }

    /// Current file length; recorded in batch info at commit.
    pub fn len(&self) -> u64 {
        self.stream.len()
    }

    /// Whether nothing has been posted yet.
    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    fn read_header(&self, offset: i64) -> Result<PageHeader> {
        if offset < 0 || offset as u64 + HEADER_LEN > self.stream.len() {
            return Err(ArborError::misaligned(format!(
                "invalid postings offset {offset}"
            )));
        }
        let mut buf = [0u8; HEADER_LEN as usize];
        self.stream.read_at(offset as u64, &mut buf)?;
        Ok(PageHeader {
            count: i64::from_be_bytes(buf[0..8].try_into().unwrap()),
            next: i64::from_be_bytes(buf[8..16].try_into().unwrap()),
            last: i64::from_be_bytes(buf[16..24].try_into().unwrap()),
        })
    }

    fn write_page(&self, doc_ids: &[u64], next: i64, last: i64) -> Result<(i64, i32)> {
        let mut page = Vec::with_capacity(HEADER_LEN as usize + doc_ids.len() * 8);
        page.extend_from_slice(&(doc_ids.len() as i64).to_be_bytes());
        page.extend_from_slice(&next.to_be_bytes());
        page.extend_from_slice(&last.to_be_bytes());
        for doc_id in doc_ids {
            page.extend_from_slice(&doc_id.to_be_bytes());
        }
        let offset = self.stream.append(&page)? as i64;
        Ok((offset, page.len() as i32))
    }

    /// Create a new list at the tail of the file. The head's `last` points
    /// at itself until a second page is appended.
    pub fn create_list(&self, doc_ids: &[u64]) -> Result<PostingsAddress> {
        let _guard = self.write_lock.lock();
        let offset = self.stream.len() as i64;
        let (actual, length) = self.write_page(doc_ids, -1, offset)?;
        debug_assert_eq!(actual, offset);
        Ok(PostingsAddress::new(offset, length))
    }

    /// Append doc ids to an existing list identified by its head offset.
    ///
    /// Writes a fresh tail page, then patches the old tail's `next` and
    /// the head's `last`. The head offset stays the list's identity.
    pub fn append_to(&self, head_offset: i64, doc_ids: &[u64]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.invalidate(head_offset);

        let head = self.read_header(head_offset)?;
        let old_tail = head.last;
        // Invariant: the head's last names a page whose next is -1.
        let tail = self.read_header(old_tail)?;
        if tail.next != -1 {
            return Err(ArborError::misaligned(format!(
                "tail page {old_tail} of list {head_offset} has a successor"
            )));
        }

        let (new_offset, _) = self.write_page(doc_ids, -1, -1)?;
        self.stream.patch_i64(old_tail as u64 + 8, new_offset)?;
        self.stream.patch_i64(head_offset as u64 + 16, new_offset)?;
        Ok(())
    }

    /// Apply one bulk-write frame: for each list, create (`head == -1`) or
    /// append. Returns the response offset per list: the fresh head for a
    /// new list, the unchanged head otherwise.
    pub fn write_many(&self, lists: &[(i64, Vec<u64>)]) -> Result<Vec<i64>> {
        let mut offsets = Vec::with_capacity(lists.len());
        for (head, doc_ids) in lists {
            if *head == -1 {
                offsets.push(self.create_list(doc_ids)?.offset);
            } else {
                self.append_to(*head, doc_ids)?;
                offsets.push(*head);
            }
        }
        Ok(offsets)
    }

    /// Resolve a full list by chasing `next` from the head page.
    ///
    /// The resolved list is memoized; a duplicate doc id encountered
    /// during the read is a broken invariant.
    pub fn read_list(&self, head_offset: i64) -> Result<Arc<Vec<u64>>> {
        if let Some(list) = self.cache.read().get(&head_offset) {
            return Ok(list.clone());
        }

        let mut doc_ids = Vec::new();
        let mut seen = AHashSet::new();
        let mut offset = head_offset;

        while offset != -1 {
            let header = self.read_header(offset)?;
            if header.count < 0 {
                return Err(ArborError::misaligned(format!(
                    "negative page count at offset {offset}"
                )));
            }
            let mut body = vec![0u8; header.count as usize * 8];
            self.stream.read_at(offset as u64 + HEADER_LEN, &mut body)?;
            for chunk in body.chunks_exact(8) {
                let doc_id = u64::from_be_bytes(chunk.try_into().unwrap());
                if !seen.insert(doc_id) {
                    return Err(ArborError::misaligned(format!(
                        "duplicate doc id {doc_id} in postings list {head_offset}"
                    )));
                }
                doc_ids.push(doc_id);
            }
            offset = header.next;
        }

        let list = Arc::new(doc_ids);
        self.cache.write().insert(head_offset, list.clone());
        Ok(list)
    }

    /// Drop the memoized list for a head about to be extended.
    pub fn invalidate(&self, head_offset: i64) {
        self.cache.write().remove(&head_offset);
    }

    /// Drop every memoized list; used when a new batch is published.
    pub fn invalidate_all(&self) {
        self.cache.write().clear();
    }

    /// Flush the underlying stream.
    pub fn flush(&self) -> Result<()> {
        self.stream.flush()
    }
}
