//! Version-scoped read sessions.
//!
//! A read session is a single-threaded view over one published batch:
//! the batch info plus term-tree readers resolved per field. Multiple
//! read sessions against the same batch may run in parallel; they share
//! the context's stores and postings cache.

use std::sync::Arc;

use crate::engine::config::TermIndexKind;
use crate::error::Result;
use crate::index::trie_io::TrieReader;
use crate::index::vtree_io::VTreeReader;
use crate::session::SessionContext;
use crate::version::{self, BatchInfo};

/// A per-field term-tree reader of either generation.
#[derive(Debug)]
pub enum TermReader {
    Trie(TrieReader),
    Vector(VTreeReader),
}

/// A read session over one published batch.
#[derive(Debug)]
pub struct ReadSession {
    context: Arc<SessionContext>,
    batch: BatchInfo,
}

impl ReadSession {
    /// Open a session over `version`. Fails if the version was never
    /// published.
    pub fn open(context: Arc<SessionContext>, version: i64) -> Result<Self> {
        let batch = version::read_batch_info(context.collection(), version)?;
        Ok(Self { context, batch })
    }

    pub fn batch(&self) -> &BatchInfo {
        &self.batch
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Resolve the term-tree reader of one field for this batch, or
    /// `None` when the field was not indexed in it.
    pub fn term_reader(&self, field: &str) -> Result<Option<TermReader>> {
        let collection = self.context.collection();
        match self.context.config().index_kind {
            TermIndexKind::Trie => {
                let path = collection.trie_path(self.batch.version, field);
                if !path.exists() {
                    return Ok(None);
                }
                Ok(Some(TermReader::Trie(TrieReader::open(path))))
            }
            TermIndexKind::Vector => {
                let Some(key_id) = self.context.keys.lookup(field) else {
                    return Ok(None);
                };
                let path = collection.vtree_path(self.batch.version, key_id);
                if !path.exists() {
                    return Ok(None);
                }
                let config = self.context.config();
                Ok(Some(TermReader::Vector(VTreeReader::load(
                    &path,
                    &self.context.vec_stream,
                    config.identical_angle,
                    config.fold_angle,
                )?)))
            }
        }
    }
}
