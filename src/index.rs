//! Term indexes.
//!
//! The engine carries two generations of the per-field term index:
//!
//! - [`trie`] / [`trie_io`] - a left-child/right-sibling character trie
//!   with exact, prefix, edit-distance and range lookups, serialized as a
//!   preorder record stream read back through a streaming cursor.
//! - [`vtree`] / [`vtree_io`] - a binary tree whose branching is governed
//!   by cosine-angle similarity between token embeddings, with a
//!   closest-match lookup.
//!
//! Both attach a postings address to every indexed term at flush time.

pub mod trie;
pub mod trie_io;
pub mod vector;
pub mod vtree;
pub mod vtree_io;

use crate::analysis::Analyzer;
use crate::index::trie::TermTrie;
use crate::index::vtree::VectorTree;

/// The in-memory model a write session builds per field, in whichever
/// index generation the collection is configured for.
#[derive(Debug)]
pub enum TermModel {
    Trie(TermTrie),
    Vector(VectorTree),
}

impl TermModel {
    /// Insert one analyzed token occurrence. Embeddings are only derived
    /// for the vector generation.
    pub fn insert_token(&mut self, analyzer: &Analyzer, token: &str, doc_id: u64) {
        match self {
            TermModel::Trie(trie) => trie.insert(token, doc_id),
            TermModel::Vector(tree) => tree.insert(analyzer.embed(token), doc_id),
        }
    }

    /// Whether a token occurrence is reachable; the validator re-queries
    /// the tree with this after the builders drain.
    pub fn validate_token(&self, analyzer: &Analyzer, token: &str, doc_id: u64) -> bool {
        match self {
            TermModel::Trie(trie) => trie.docs(token).is_some_and(|docs| docs.contains(&doc_id)),
            TermModel::Vector(tree) => tree
                .closest_match(&analyzer.embed(token))
                .is_some_and(|hit| hit.identical && hit.docs.contains(&doc_id)),
        }
    }

    /// Whether anything was inserted.
    pub fn is_empty(&self) -> bool {
        match self {
            TermModel::Trie(trie) => trie.is_empty(),
            TermModel::Vector(tree) => tree.is_empty(),
        }
    }
}
