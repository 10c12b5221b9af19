//! Boolean reduction over postings lists.
//!
//! The postings side of the engine performs the reduction itself: given a
//! sequence of `(head offset, operator, score)` cursors it resolves each
//! list (memoized or from disk) and folds left into a scored accumulator.

use ahash::{AHashMap, AHashSet};

use crate::error::Result;
use crate::postings::store::PostingsStore;

/// Boolean operator of one reduce cursor. The `u8` values are the wire
/// tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BoolOp {
    Or = 0,
    And = 1,
    Not = 2,
}

impl BoolOp {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BoolOp::Or),
            1 => Some(BoolOp::And),
            2 => Some(BoolOp::Not),
            _ => None,
        }
    }
}

/// One term's contribution to a reduction.
#[derive(Debug, Clone, Copy)]
pub struct ReduceCursor {
    /// Head offset of the postings list.
    pub address: i64,
    pub op: BoolOp,
    /// Score added to each doc the list contributes.
    pub score: f32,
}

/// A scored doc-id accumulator that remembers insertion order, so equal
/// scores page deterministically.
///
/// Shared between the address-based [`reduce`] fold and the query
/// evaluator, which folds statement-level scored sets built from term
/// expansions.
#[derive(Debug, Default)]
pub struct ScoredSet {
    order: Vec<u64>,
    scores: AHashMap<u64, f32>,
}

impl ScoredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Union: add each doc's score, appending unseen docs at the end.
    pub fn union(&mut self, pairs: &[(u64, f32)]) {
        for &(doc_id, score) in pairs {
            if let Some(existing) = self.scores.get_mut(&doc_id) {
                *existing += score;
            } else {
                self.scores.insert(doc_id, score);
                self.order.push(doc_id);
            }
        }
    }

    /// Intersection: keep only docs present in `pairs`, adding their score.
    pub fn intersect(&mut self, pairs: &[(u64, f32)]) {
        let keep: AHashMap<u64, f32> = pairs.iter().copied().collect();
        self.order.retain(|doc_id| keep.contains_key(doc_id));
        self.scores.retain(|doc_id, _| keep.contains_key(doc_id));
        for (doc_id, score_slot) in self.scores.iter_mut() {
            *score_slot += keep[doc_id];
        }
    }

    /// Difference: drop every doc present in `pairs`.
    pub fn subtract(&mut self, pairs: &[(u64, f32)]) {
        let drop: AHashSet<u64> = pairs.iter().map(|(doc_id, _)| *doc_id).collect();
        self.order.retain(|doc_id| !drop.contains(doc_id));
        self.scores.retain(|doc_id, _| !drop.contains(doc_id));
    }

    /// Drain into `(doc_id, score)` pairs in insertion order.
    pub fn into_pairs(self) -> Vec<(u64, f32)> {
        let scores = self.scores;
        self.order
            .into_iter()
            .map(|doc_id| (doc_id, scores[&doc_id]))
            .collect()
    }
}

/// Stable sort for scored pairs: score descending, doc id ascending.
pub fn sort_scored(pairs: &mut [(u64, f32)]) {
    pairs.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

/// Fold the cursors left into a scored doc set, sort descending by score
/// (stable; doc id breaks remaining ties), and page with `skip`/`take`.
///
/// The first non-`Not` cursor seeds the accumulator regardless of its
/// operator; a leading `Not` contributes nothing to subtract from.
/// Returns the total hit count before paging plus the page itself.
pub fn reduce(
    store: &PostingsStore,
    cursors: &[ReduceCursor],
    skip: usize,
    take: usize,
) -> Result<(i64, Vec<(u64, f32)>)> {
    let mut accumulator = ScoredSet::new();
    let mut seeded = false;

    for cursor in cursors {
        let list = store.read_list(cursor.address)?;
        let pairs: Vec<(u64, f32)> = list.iter().map(|&doc_id| (doc_id, cursor.score)).collect();
        if !seeded {
            if cursor.op != BoolOp::Not {
                accumulator.union(&pairs);
                seeded = true;
            }
            continue;
        }
        match cursor.op {
            BoolOp::Or => accumulator.union(&pairs),
            BoolOp::And => accumulator.intersect(&pairs),
            BoolOp::Not => accumulator.subtract(&pairs),
        }
    }

    let mut pairs = accumulator.into_pairs();
    sort_scored(&mut pairs);

    let total = pairs.len() as i64;
    let page: Vec<(u64, f32)> = pairs.into_iter().skip(skip).take(take).collect();
    Ok((total, page))
}
