//! In-memory left-child/right-sibling term trie.
//!
//! Insertion walks the sibling chain at each depth and appends a new
//! sibling when no code unit matches; lookups that promise lexicographic
//! output (`starts_with`, `range`, serialization) visit siblings in
//! code-unit order regardless of insertion order.

use crate::postings::PostingsAddress;

/// One trie node. `docs` and `postings` are only populated on end-of-word
/// nodes; `postings` is attached at flush time.
#[derive(Debug)]
pub struct TrieNode {
    pub ch: char,
    pub end_of_word: bool,
    pub docs: Vec<u64>,
    pub postings: Option<PostingsAddress>,
    pub child: Option<Box<TrieNode>>,
    pub sibling: Option<Box<TrieNode>>,
}

impl TrieNode {
    fn new(ch: char) -> Self {
        Self {
            ch,
            end_of_word: false,
            docs: Vec::new(),
            postings: None,
            child: None,
            sibling: None,
        }
    }
}

/// An LCRS trie over the terms of one field.
#[derive(Debug, Default)]
pub struct TermTrie {
    first_child: Option<Box<TrieNode>>,
    term_count: usize,
}

/// Find the sibling-chain node matching `ch` under `slot`, inserting a new
/// node at the end of the chain if none matches.
fn find_or_insert_child(slot: &mut Option<Box<TrieNode>>, ch: char) -> &mut TrieNode {
    match slot {
        Some(node) => {
            if node.ch == ch {
                node
            } else {
                find_or_insert_child(&mut node.sibling, ch)
            }
        }
        None => {
            *slot = Some(Box::new(TrieNode::new(ch)));
            slot.as_mut().unwrap()
        }
    }
}

/// Walk/create the path for the remaining characters of a term, starting at
/// `slot`, incrementing `term_count` when a new end-of-word is created.
fn insert_chars(
    slot: &mut Option<Box<TrieNode>>,
    mut chars: std::iter::Peekable<std::str::Chars>,
    doc_id: u64,
    term_count: &mut usize,
) {
    let ch = match chars.next() {
        Some(ch) => ch,
        None => return,
    };
    let node = find_or_insert_child(slot, ch);
    if chars.peek().is_some() {
        insert_chars(&mut node.child, chars, doc_id, term_count);
    } else {
        if !node.end_of_word {
            node.end_of_word = true;
            *term_count += 1;
        }
        if !node.docs.contains(&doc_id) {
            node.docs.push(doc_id);
        }
    }
}

impl TermTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct indexed terms.
    pub fn term_count(&self) -> usize {
        self.term_count
    }

    /// Whether no term has been inserted.
    pub fn is_empty(&self) -> bool {
        self.term_count == 0
    }

    /// Insert a term occurrence for `doc_id`.
    pub fn insert(&mut self, term: &str, doc_id: u64) {
        if term.is_empty() {
            return;
        }

        let chars = term.chars().peekable();
        insert_chars(&mut self.first_child, chars, doc_id, &mut self.term_count);
    }

    fn locate(&self, term: &str) -> Option<&TrieNode> {
        let mut chain = self.first_child.as_deref();
        let mut found = None;
        for ch in term.chars() {
            let mut node = chain?;
            loop {
                if node.ch == ch {
                    break;
                }
                node = node.sibling.as_deref()?;
            }
            found = Some(node);
            chain = node.child.as_deref();
        }
        found
    }

    /// Whether `term` is an indexed term.
    pub fn has(&self, term: &str) -> bool {
        self.locate(term).is_some_and(|n| n.end_of_word)
    }

    /// The doc ids accumulated for `term`, if it is indexed.
    pub fn docs(&self, term: &str) -> Option<&[u64]> {
        self.locate(term)
            .filter(|n| n.end_of_word)
            .map(|n| n.docs.as_slice())
    }

    /// Enumerate all terms sharing `prefix`, in lexicographic order.
    pub fn starts_with(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();

        if prefix.is_empty() {
            walk_sorted(self.first_child.as_deref(), &mut String::new(), &mut |term, _| {
                out.push(term.to_string())
            });
            return out;
        }

        let Some(node) = self.locate(prefix) else {
            return out;
        };
        if node.end_of_word {
            out.push(prefix.to_string());
        }
        let mut path = prefix.to_string();
        walk_sorted(node.child.as_deref(), &mut path, &mut |term, _| {
            out.push(term.to_string())
        });
        out
    }

    /// Find terms within `max_edits` Levenshtein distance of `term`.
    ///
    /// Results are sorted ascending by distance; equal distances keep
    /// traversal order. The walk carries one DP row per depth and
    /// backtracks as soon as the minimum achievable distance exceeds the
    /// budget.
    pub fn near(&self, term: &str, max_edits: u32) -> Vec<(String, u32)> {
        let target: Vec<char> = term.chars().collect();
        let first_row: Vec<u32> = (0..=target.len() as u32).collect();
        let mut out = Vec::new();
        let mut path = String::new();

        near_walk(
            self.first_child.as_deref(),
            &target,
            &first_row,
            max_edits,
            &mut path,
            &mut out,
        );
        out.sort_by_key(|(_, distance)| *distance);
        out
    }

    /// Enumerate terms between `lo` and `hi`, inclusive on both ends, in
    /// lexicographic order. The endpoints need not be indexed terms.
    pub fn range(&self, lo: &str, hi: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut path = String::new();
        walk_sorted(self.first_child.as_deref(), &mut path, &mut |term, _| {
            if term >= lo && term <= hi {
                out.push(term.to_string());
            }
        });
        out
    }

    /// All `(term, docs)` pairs in lexicographic order; the column
    /// serializer posts these as one bulk postings frame.
    pub fn postings_payload(&self) -> Vec<(String, Vec<u64>)> {
        let mut out = Vec::new();
        let mut path = String::new();
        walk_sorted(self.first_child.as_deref(), &mut path, &mut |term, node| {
            out.push((term.to_string(), node.docs.clone()))
        });
        out
    }

    /// Attach the postings address of every term, in the same lexicographic
    /// order [`postings_payload`](Self::postings_payload) produced.
    pub fn attach_postings(&mut self, addresses: &ahash::AHashMap<String, PostingsAddress>) {
        let mut path = String::new();
        attach_walk(self.first_child.as_deref_mut(), &mut path, addresses);
    }

    pub(crate) fn first_child(&self) -> Option<&TrieNode> {
        self.first_child.as_deref()
    }
}

/// Collect a sibling chain as references sorted by code unit.
pub(crate) fn sorted_chain(first: Option<&TrieNode>) -> Vec<&TrieNode> {
    let mut chain = Vec::new();
    let mut cursor = first;
    while let Some(node) = cursor {
        chain.push(node);
        cursor = node.sibling.as_deref();
    }
    chain.sort_by_key(|n| n.ch);
    chain
}

fn walk_sorted<'a>(
    first: Option<&'a TrieNode>,
    path: &mut String,
    visit: &mut impl FnMut(&str, &'a TrieNode),
) {
    for node in sorted_chain(first) {
        path.push(node.ch);
        if node.end_of_word {
            visit(path, node);
        }
        walk_sorted(node.child.as_deref(), path, visit);
        path.pop();
    }
}

fn attach_walk(
    first: Option<&mut TrieNode>,
    path: &mut String,
    addresses: &ahash::AHashMap<String, PostingsAddress>,
) {
    let mut cursor = first;
    while let Some(node) = cursor {
        path.push(node.ch);
        if node.end_of_word {
            if let Some(address) = addresses.get(path.as_str()) {
                node.postings = Some(*address);
            }
        }
        attach_walk(node.child.as_deref_mut(), path, addresses);
        path.pop();
        cursor = node.sibling.as_deref_mut();
    }
}

fn near_walk(
    first: Option<&TrieNode>,
    target: &[char],
    prev_row: &[u32],
    max_edits: u32,
    path: &mut String,
    out: &mut Vec<(String, u32)>,
) {
    let mut cursor = first;
    while let Some(node) = cursor {
        let mut row = Vec::with_capacity(target.len() + 1);
        row.push(prev_row[0] + 1);
        for (j, &tc) in target.iter().enumerate() {
            let cost = if node.ch == tc { 0 } else { 1 };
            let value = (prev_row[j + 1] + 1)
                .min(row[j] + 1)
                .min(prev_row[j] + cost);
            row.push(value);
        }

        path.push(node.ch);
        if node.end_of_word && row[target.len()] <= max_edits {
            out.push((path.clone(), row[target.len()]));
        }
        if row.iter().min().copied().unwrap_or(u32::MAX) <= max_edits {
            near_walk(node.child.as_deref(), target, &row, max_edits, path, out);
        }
        path.pop();
        cursor = node.sibling.as_deref();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trie(terms: &[&str]) -> TermTrie {
        let mut trie = TermTrie::new();
        for (i, term) in terms.iter().enumerate() {
            trie.insert(term, i as u64);
        }
        trie
    }

    #[test]
    fn test_insert_and_has() {
        let trie = make_trie(&["rambo", "rocky", "raiders"]);
        assert!(trie.has("rambo"));
        assert!(trie.has("rocky"));
        assert!(!trie.has("ram"));
        assert!(!trie.has("rambos"));
        assert_eq!(trie.term_count(), 3);
    }

    #[test]
    fn test_shared_prefix() {
        let trie = make_trie(&["ram", "rambo"]);
        assert!(trie.has("ram"));
        assert!(trie.has("rambo"));
        assert_eq!(trie.term_count(), 2);
    }

    #[test]
    fn test_docs_deduplicated() {
        let mut trie = TermTrie::new();
        trie.insert("the", 3);
        trie.insert("the", 4);
        trie.insert("the", 3);
        assert_eq!(trie.docs("the"), Some(&[3, 4][..]));
    }

    #[test]
    fn test_starts_with_lexicographic() {
        let trie = make_trie(&["rocky", "rambo", "rain", "raiders", "the"]);
        assert_eq!(
            trie.starts_with("ra"),
            vec!["raiders".to_string(), "rain".to_string(), "rambo".to_string()]
        );
        assert_eq!(trie.starts_with("").len(), 5);
        assert!(trie.starts_with("z").is_empty());
    }

    #[test]
    fn test_starts_with_includes_prefix_term() {
        let trie = make_trie(&["ram", "rambo"]);
        assert_eq!(
            trie.starts_with("ram"),
            vec!["ram".to_string(), "rambo".to_string()]
        );
    }

    #[test]
    fn test_near() {
        let trie = make_trie(&["raider", "raiders", "rain", "rambo"]);
        let hits = trie.near("raider", 1);
        assert_eq!(hits[0], ("raider".to_string(), 0));
        assert!(hits.contains(&("raiders".to_string(), 1)));
        assert!(!hits.iter().any(|(t, _)| t == "rambo"));
    }

    #[test]
    fn test_near_monotone_in_budget() {
        let trie = make_trie(&["raider", "raiders", "rain", "rider", "ride"]);
        for budget in 0..3u32 {
            let smaller: Vec<String> =
                trie.near("raider", budget).into_iter().map(|(t, _)| t).collect();
            let larger: Vec<String> = trie
                .near("raider", budget + 1)
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            for term in &smaller {
                assert!(larger.contains(term), "{term} lost at budget {}", budget + 1);
            }
        }
    }

    #[test]
    fn test_range_inclusive() {
        let trie = make_trie(&[
            "0000123", "0000333", "0000666", "0012345", "0077777", "0100006", "1000989",
        ]);
        assert_eq!(
            trie.range("0000333", "0100006"),
            vec!["0000333", "0000666", "0012345", "0077777", "0100006"]
        );
    }

    #[test]
    fn test_range_with_absent_endpoints() {
        let trie = make_trie(&["bb", "cc", "dd"]);
        assert_eq!(trie.range("ba", "cz"), vec!["bb", "cc"]);
    }

    #[test]
    fn test_postings_payload_order() {
        let trie = make_trie(&["rocky", "rambo", "raiders"]);
        let payload = trie.postings_payload();
        let terms: Vec<&str> = payload.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["raiders", "rambo", "rocky"]);
    }
}
