//! Trie serialization and the streaming cursor reader.
//!
//! ## File format
//!
//! One record per node, depth-first, left-child-first preorder with
//! sibling chains in code-unit order:
//!
//! ```text
//! [u32: code unit] [u8: flags] [i64: postings offset, i32: length]?
//! ```
//!
//! The postings address trailer is present only when the end-of-word flag
//! is set. Flags: bit 0 = child present, bit 1 = sibling present, bit 2 =
//! end of word.
//!
//! The reader never seeks: a lookup streams records forward, skipping a
//! non-matching sibling by consuming its entire subtree, and a one-record
//! replay buffer lets a caller peek without losing the record.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{ArborError, Result};
use crate::index::trie::{sorted_chain, TermTrie, TrieNode};
use crate::postings::PostingsAddress;

const FLAG_CHILD: u8 = 1;
const FLAG_SIBLING: u8 = 1 << 1;
const FLAG_END_OF_WORD: u8 = 1 << 2;

/// One serialized trie node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    pub ch: char,
    pub has_child: bool,
    pub has_sibling: bool,
    pub end_of_word: bool,
    pub postings: Option<PostingsAddress>,
}

/// Serialize a trie into its preorder record stream.
///
/// Every end-of-word node must already carry its postings address; the
/// column serializer posts the lists before calling this.
pub fn encode_trie(trie: &TermTrie) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_chain(trie.first_child(), &mut out)?;
    Ok(out)
}

fn encode_chain(first: Option<&TrieNode>, out: &mut Vec<u8>) -> Result<()> {
    let chain = sorted_chain(first);
    let last = chain.len().saturating_sub(1);
    for (i, node) in chain.iter().enumerate() {
        let mut flags = 0u8;
        if node.child.is_some() {
            flags |= FLAG_CHILD;
        }
        if i < last {
            flags |= FLAG_SIBLING;
        }
        if node.end_of_word {
            flags |= FLAG_END_OF_WORD;
        }

        out.extend_from_slice(&(node.ch as u32).to_be_bytes());
        out.push(flags);

        if node.end_of_word {
            let address = node.postings.ok_or_else(|| {
                ArborError::internal(format!(
                    "term node '{}' serialized before postings were attached",
                    node.ch
                ))
            })?;
            out.extend_from_slice(&address.offset.to_be_bytes());
            out.extend_from_slice(&address.length.to_be_bytes());
        }

        encode_chain(node.child.as_deref(), out)?;
    }
    Ok(())
}

/// Streaming record reader with a one-record replay buffer.
pub struct TrieCursor<R: Read> {
    reader: R,
    replay: Option<NodeRecord>,
}

impl<R: Read> TrieCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            replay: None,
        }
    }

    /// Read the next record, or `None` at end of stream.
    pub fn advance(&mut self) -> Result<Option<NodeRecord>> {
        if let Some(record) = self.replay.take() {
            return Ok(Some(record));
        }

        let mut head = [0u8; 5];
        match self.reader.read_exact(&mut head) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(ArborError::Io(err)),
        }

        let code = u32::from_be_bytes(head[0..4].try_into().unwrap());
        let ch = char::from_u32(code)
            .ok_or_else(|| ArborError::misaligned(format!("invalid code unit {code} in trie")))?;
        let flags = head[4];
        let end_of_word = flags & FLAG_END_OF_WORD != 0;

        let postings = if end_of_word {
            let mut trailer = [0u8; 12];
            self.reader.read_exact(&mut trailer).map_err(|_| {
                ArborError::misaligned("trie record missing postings trailer")
            })?;
            Some(PostingsAddress::new(
                i64::from_be_bytes(trailer[0..8].try_into().unwrap()),
                i32::from_be_bytes(trailer[8..12].try_into().unwrap()),
            ))
        } else {
            None
        };

        Ok(Some(NodeRecord {
            ch,
            has_child: flags & FLAG_CHILD != 0,
            has_sibling: flags & FLAG_SIBLING != 0,
            end_of_word,
            postings,
        }))
    }

    /// Push a record back so the next [`advance`](Self::advance) returns it.
    pub fn replay(&mut self, record: NodeRecord) {
        debug_assert!(self.replay.is_none());
        self.replay = Some(record);
    }

    /// Consume one node and its whole subtree (child chain and siblings).
    fn consume_node(&mut self) -> Result<()> {
        let record = self
            .advance()?
            .ok_or_else(|| ArborError::misaligned("trie stream ended inside a subtree"))?;
        if record.has_child {
            self.consume_node()?;
        }
        if record.has_sibling {
            self.consume_node()?;
        }
        Ok(())
    }

    /// Walk the current sibling chain until a record matching `ch` is
    /// found, consuming the subtrees of skipped siblings. Returns `None`
    /// when the chain runs out.
    fn find_in_chain(&mut self, ch: char) -> Result<Option<NodeRecord>> {
        loop {
            let Some(record) = self.advance()? else {
                return Ok(None);
            };
            if record.ch == ch {
                return Ok(Some(record));
            }
            if record.has_child {
                self.consume_node()?;
            }
            if !record.has_sibling {
                return Ok(None);
            }
        }
    }
}

/// Read-side handle over one serialized per-field trie.
///
/// Each lookup streams the file from the start; the cursor never seeks
/// backwards.
#[derive(Debug, Clone)]
pub struct TrieReader {
    path: PathBuf,
}

impl TrieReader {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cursor(&self) -> Result<TrieCursor<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(TrieCursor::new(BufReader::new(file)))
    }

    /// Locate the node spelling `term`, if present.
    fn descend(
        cursor: &mut TrieCursor<BufReader<File>>,
        term: &str,
    ) -> Result<Option<NodeRecord>> {
        let mut found = None;
        let mut chars = term.chars().peekable();
        while let Some(ch) = chars.next() {
            let Some(record) = cursor.find_in_chain(ch)? else {
                return Ok(None);
            };
            if chars.peek().is_some() && !record.has_child {
                return Ok(None);
            }
            found = Some(record);
        }
        Ok(found)
    }

    /// Exact lookup: the postings address of `term`, if indexed.
    pub fn has(&self, term: &str) -> Result<Option<PostingsAddress>> {
        if term.is_empty() {
            return Ok(None);
        }
        let mut cursor = self.cursor()?;
        match Self::descend(&mut cursor, term)? {
            Some(record) if record.end_of_word => Ok(record.postings),
            _ => Ok(None),
        }
    }

    /// Enumerate all `(term, postings)` pairs sharing `prefix`, in
    /// lexicographic order.
    pub fn starts_with(&self, prefix: &str) -> Result<Vec<(String, PostingsAddress)>> {
        let mut cursor = self.cursor()?;
        let mut out = Vec::new();

        if prefix.is_empty() {
            let mut path = String::new();
            collect_chain(&mut cursor, &mut path, &mut |term, address| {
                out.push((term.to_string(), address))
            })?;
            return Ok(out);
        }

        let Some(record) = Self::descend(&mut cursor, prefix)? else {
            return Ok(out);
        };
        if record.end_of_word {
            if let Some(address) = record.postings {
                out.push((prefix.to_string(), address));
            }
        }
        if record.has_child {
            let mut path = prefix.to_string();
            collect_chain(&mut cursor, &mut path, &mut |term, address| {
                out.push((term.to_string(), address))
            })?;
        }
        Ok(out)
    }

    /// Edit-distance lookup, ascending by distance; stream order breaks
    /// ties.
    pub fn near(&self, term: &str, max_edits: u32) -> Result<Vec<(String, u32, PostingsAddress)>> {
        let target: Vec<char> = term.chars().collect();
        let first_row: Vec<u32> = (0..=target.len() as u32).collect();
        let mut cursor = self.cursor()?;
        let mut out = Vec::new();
        let mut path = String::new();

        near_chain(&mut cursor, &target, &first_row, max_edits, &mut path, &mut out)?;
        out.sort_by_key(|(_, distance, _)| *distance);
        Ok(out)
    }

    /// Lexicographic enumeration between `lo` and `hi`, both inclusive.
    pub fn range(&self, lo: &str, hi: &str) -> Result<Vec<(String, PostingsAddress)>> {
        let mut cursor = self.cursor()?;
        let mut out = Vec::new();
        let mut path = String::new();
        collect_chain(&mut cursor, &mut path, &mut |term, address| {
            if term >= lo && term <= hi {
                out.push((term.to_string(), address));
            }
        })?;
        Ok(out)
    }
}

/// Depth-first emit of every end-of-word node under the cursor's current
/// sibling chain.
fn collect_chain<R: Read>(
    cursor: &mut TrieCursor<R>,
    path: &mut String,
    visit: &mut impl FnMut(&str, PostingsAddress),
) -> Result<()> {
    loop {
        let Some(record) = cursor.advance()? else {
            return Ok(());
        };
        path.push(record.ch);
        if record.end_of_word {
            if let Some(address) = record.postings {
                visit(path, address);
            }
        }
        if record.has_child {
            collect_chain(cursor, path, visit)?;
        }
        path.pop();
        if !record.has_sibling {
            return Ok(());
        }
    }
}

fn near_chain<R: Read>(
    cursor: &mut TrieCursor<R>,
    target: &[char],
    prev_row: &[u32],
    max_edits: u32,
    path: &mut String,
    out: &mut Vec<(String, u32, PostingsAddress)>,
) -> Result<()> {
    loop {
        let Some(record) = cursor.advance()? else {
            return Ok(());
        };

        let mut row = Vec::with_capacity(target.len() + 1);
        row.push(prev_row[0] + 1);
        for (j, &tc) in target.iter().enumerate() {
            let cost = if record.ch == tc { 0 } else { 1 };
            let value = (prev_row[j + 1] + 1)
                .min(row[j] + 1)
                .min(prev_row[j] + cost);
            row.push(value);
        }

        path.push(record.ch);
        if record.end_of_word && row[target.len()] <= max_edits {
            if let Some(address) = record.postings {
                out.push((path.clone(), row[target.len()], address));
            }
        }
        if record.has_child {
            if row.iter().min().copied().unwrap_or(u32::MAX) <= max_edits {
                near_chain(cursor, target, &row, max_edits, path, out)?;
            } else {
                cursor.consume_node()?;
            }
        }
        path.pop();
        if !record.has_sibling {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    /// Build a trie, give every term a fake distinct postings address, and
    /// serialize it to a temp file.
    fn make_reader(terms: &[&str]) -> (tempfile::TempDir, TrieReader, AHashMap<String, i64>) {
        let mut trie = TermTrie::new();
        for (i, term) in terms.iter().enumerate() {
            trie.insert(term, i as u64);
        }

        let mut addresses = AHashMap::new();
        let mut offsets = AHashMap::new();
        for (i, (term, _)) in trie.postings_payload().into_iter().enumerate() {
            let offset = (i as i64 + 1) * 100;
            addresses.insert(term.clone(), PostingsAddress::new(offset, 24));
            offsets.insert(term, offset);
        }
        trie.attach_postings(&addresses);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field.tri");
        std::fs::write(&path, encode_trie(&trie).unwrap()).unwrap();
        (dir, TrieReader::open(path), offsets)
    }

    #[test]
    fn test_has_round_trip() {
        let terms = ["rambo", "rocky", "raiders", "rain", "the"];
        let (_dir, reader, offsets) = make_reader(&terms);

        for term in terms {
            let address = reader.has(term).unwrap().unwrap();
            assert_eq!(address.offset, offsets[term], "term {term}");
        }
        assert!(reader.has("ram").unwrap().is_none());
        assert!(reader.has("rambos").unwrap().is_none());
        assert!(reader.has("zzz").unwrap().is_none());
        assert!(reader.has("").unwrap().is_none());
    }

    #[test]
    fn test_enumeration_is_lexicographic() {
        let terms = ["rocky", "rambo", "rain", "raiders", "the", "ram"];
        let (_dir, reader, _) = make_reader(&terms);

        let all: Vec<String> = reader
            .starts_with("")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        let mut expected: Vec<String> = terms.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_starts_with_prefix_subtree() {
        let (_dir, reader, _) = make_reader(&["rambo", "rambo2", "ram", "rocky"]);
        let hits: Vec<String> = reader
            .starts_with("ram")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(hits, vec!["ram", "rambo", "rambo2"]);
    }

    #[test]
    fn test_near_on_disk() {
        let (_dir, reader, _) = make_reader(&["raider", "raiders", "rain", "rambo"]);
        let hits = reader.near("raider", 1).unwrap();
        assert_eq!(hits[0].0, "raider");
        assert_eq!(hits[0].1, 0);
        assert!(hits.iter().any(|(t, d, _)| t == "raiders" && *d == 1));
        assert!(!hits.iter().any(|(t, _, _)| t == "rambo"));
    }

    #[test]
    fn test_range_on_disk() {
        let (_dir, reader, _) = make_reader(&[
            "0000123", "0000333", "0000666", "0012345", "0077777", "0100006", "1000989",
        ]);
        let hits: Vec<String> = reader
            .range("0000333", "0100006")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            hits,
            vec!["0000333", "0000666", "0012345", "0077777", "0100006"]
        );
    }

    #[test]
    fn test_replay_buffer() {
        let (_dir, reader, _) = make_reader(&["ab"]);
        let file = std::fs::File::open(reader.path()).unwrap();
        let mut cursor = TrieCursor::new(std::io::BufReader::new(file));

        let first = cursor.advance().unwrap().unwrap();
        assert_eq!(first.ch, 'a');
        cursor.replay(first);

        // The replayed record comes back before the stream advances.
        let again = cursor.advance().unwrap().unwrap();
        assert_eq!(again.ch, 'a');
        let second = cursor.advance().unwrap().unwrap();
        assert_eq!(second.ch, 'b');
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tri");
        std::fs::write(&path, []).unwrap();
        let reader = TrieReader::open(path);
        assert!(reader.has("x").unwrap().is_none());
        assert!(reader.starts_with("").unwrap().is_empty());
    }

    #[test]
    fn test_serialize_requires_addresses() {
        let mut trie = TermTrie::new();
        trie.insert("rambo", 0);
        assert!(encode_trie(&trie).is_err());
    }
}
