//! Query evaluation.
//!
//! For each published batch, newest first, every statement resolves its
//! term against the per-field term tree: exact terms through `has`,
//! `~`-modified terms through `near`, `*`-modified terms through
//! `starts_with`, comparison statements through `range`. Expansions are
//! unioned into one scored set per statement, statements compose through
//! the boolean fold, and later versions shadow earlier ones on the
//! batch's primary key. The top of the scored set is materialized into
//! documents.

use std::sync::Arc;

use ahash::AHashSet;

use crate::data::Document;
use crate::error::Result;
use crate::postings::reduce::{sort_scored, ScoredSet};
use crate::postings::PostingsAddress;
use crate::query::parser::{Comparison, QueryNode, QueryOp, QueryParser, TermModifier};
use crate::query::score::{fuzzy_weight, idf};
use crate::session::read::{ReadSession, TermReader};
use crate::session::SessionContext;
use crate::version;

/// One scored, materialized search hit.
#[derive(Debug)]
pub struct SearchHit {
    pub doc_id: u64,
    pub score: f32,
    pub document: Document,
}

/// A page of hits plus the total count before paging.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Evaluate a query against every published batch of a collection.
pub fn search(
    context: &Arc<SessionContext>,
    query: &str,
    skip: usize,
    take: usize,
) -> Result<SearchResults> {
    let parser = QueryParser::new(context.analyzer().clone());
    let Some(root) = parser.parse(query)? else {
        return Ok(SearchResults::default());
    };

    let versions = version::published_versions(context.collection())?;
    let doc_count = context.doc_count();

    let mut candidates: Vec<(u64, f32)> = Vec::new();
    let mut shadowed_keys: AHashSet<String> = AHashSet::new();
    let mut seen_docs: AHashSet<u64> = AHashSet::new();

    // Newest first; later versions shadow earlier ones on the primary key.
    for &batch_version in versions.iter().rev() {
        let session = ReadSession::open(context.clone(), batch_version)?;
        let pairs = evaluate_batch(&session, &root, doc_count)?;

        let primary_key = session.batch().primary_key.clone();
        let mut batch_keys: Vec<String> = Vec::new();

        for (doc_id, score) in pairs {
            if !seen_docs.insert(doc_id) {
                continue;
            }
            if context.docs.is_deleted(doc_id) {
                continue;
            }
            if let Some(pk_field) = primary_key.as_deref() {
                if let Some(value) = context.field_value(doc_id, pk_field)? {
                    let rendered = value.render();
                    if shadowed_keys.contains(&rendered) {
                        continue;
                    }
                    batch_keys.push(rendered);
                }
            }
            candidates.push((doc_id, score));
        }
        shadowed_keys.extend(batch_keys);
    }

    sort_scored(&mut candidates);
    let total = candidates.len() as u64;

    let mut hits = Vec::new();
    for (doc_id, score) in candidates.into_iter().skip(skip).take(take) {
        if let Some(document) = context.materialize(doc_id, score)? {
            hits.push(SearchHit {
                doc_id,
                score,
                document,
            });
        }
    }

    Ok(SearchResults { total, hits })
}

/// Fold the statement chain over one batch into scored pairs.
fn evaluate_batch(
    session: &ReadSession,
    root: &QueryNode,
    doc_count: u64,
) -> Result<Vec<(u64, f32)>> {
    let mut accumulator = ScoredSet::new();
    let mut seeded = false;

    let mut statement = Some(root);
    while let Some(node) = statement {
        let pairs = resolve_statement(session, node, doc_count)?;
        if !seeded {
            if node.op != QueryOp::Not {
                accumulator.union(&pairs);
                seeded = true;
            }
            statement = node.next.as_deref();
            continue;
        }
        match node.op {
            QueryOp::Or => accumulator.union(&pairs),
            QueryOp::And => accumulator.intersect(&pairs),
            QueryOp::Not => accumulator.subtract(&pairs),
        }
        statement = node.next.as_deref();
    }

    Ok(accumulator.into_pairs())
}

/// Resolve a statement: the head term plus its `then` chain, which is an
/// inner conjunction.
fn resolve_statement(
    session: &ReadSession,
    node: &QueryNode,
    doc_count: u64,
) -> Result<Vec<(u64, f32)>> {
    let mut set = ScoredSet::new();
    set.union(&resolve_term(session, node, doc_count)?);

    let mut inner = node.then.as_deref();
    while let Some(term_node) = inner {
        set.intersect(&resolve_term(session, term_node, doc_count)?);
        inner = term_node.then.as_deref();
    }
    Ok(set.into_pairs())
}

/// Resolve one term node into scored doc pairs by scanning the term tree
/// and unioning the postings of every expansion.
fn resolve_term(
    session: &ReadSession,
    node: &QueryNode,
    doc_count: u64,
) -> Result<Vec<(u64, f32)>> {
    let Some(reader) = session.term_reader(&node.key)? else {
        return Ok(Vec::new());
    };

    let config = session.context().config();
    let expansions: Vec<(PostingsAddress, f32)> = match &reader {
        TermReader::Trie(trie) => match node.comparison {
            Some(Comparison::Gt) => trie
                .range(&node.term, MAX_TERM)?
                .into_iter()
                .filter(|(term, _)| term.as_str() > node.term.as_str())
                .map(|(_, address)| (address, 1.0))
                .collect(),
            Some(Comparison::Lt) => trie
                .range("", &node.term)?
                .into_iter()
                .filter(|(term, _)| term.as_str() < node.term.as_str())
                .map(|(_, address)| (address, 1.0))
                .collect(),
            None => match node.modifier {
                TermModifier::Exact => trie
                    .has(&node.term)?
                    .into_iter()
                    .map(|address| (address, 1.0))
                    .collect(),
                TermModifier::Fuzzy => trie
                    .near(&node.term, config.default_max_edits)?
                    .into_iter()
                    .map(|(_, distance, address)| {
                        (address, fuzzy_weight(distance, config.default_max_edits))
                    })
                    .collect(),
                TermModifier::Prefix => trie
                    .starts_with(&node.term)?
                    .into_iter()
                    .map(|(_, address)| (address, 1.0))
                    .collect(),
            },
        },
        TermReader::Vector(vtree) => {
            let embedding = session.context().analyzer().embed(&node.term);
            match vtree.closest_match(&embedding) {
                Some((address, angle)) => {
                    let accept = match node.modifier {
                        // Exact requires the same-term threshold; the
                        // modified forms accept any fold-level neighbor.
                        TermModifier::Exact => angle >= config.identical_angle,
                        TermModifier::Fuzzy | TermModifier::Prefix => {
                            angle >= config.fold_angle
                        }
                    };
                    if accept {
                        vec![(address, angle)]
                    } else {
                        Vec::new()
                    }
                }
                None => Vec::new(),
            }
        }
    };

    let mut set = ScoredSet::new();
    for (address, weight) in expansions {
        let list = session.context().postings.read_list(address.offset)?;
        let term_idf = idf(doc_count, list.len() as u64);
        let score = weight * term_idf;
        let pairs: Vec<(u64, f32)> = list.iter().map(|&doc_id| (doc_id, score)).collect();
        set.union(&pairs);
    }
    Ok(set.into_pairs())
}

/// Upper bound for open-ended range scans; no indexed term sorts above a
/// maximal code point.
const MAX_TERM: &str = "\u{10FFFF}";
