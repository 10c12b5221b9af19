//! Write and read sessions.
//!
//! A [`SessionContext`] bundles the shared per-collection handles: the
//! payload stores, the postings store, the analyzer and the vector
//! stream. Write sessions additionally hold the collection lock and the
//! indexing pipeline; read sessions are cheap version-scoped views.
//!
//! # Modules
//!
//! - [`queue`] - the bounded worker queue the pipeline runs on
//! - [`write`] - the write session and indexing pipeline
//! - [`read`] - version-scoped read sessions

pub mod queue;
pub mod read;
pub mod write;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::collection::Collection;
use crate::data::{Document, FIELD_DOC_ID, FIELD_SCORE};
use crate::engine::config::EngineConfig;
use crate::error::Result;
use crate::postings::store::PostingsStore;
use crate::storage::AppendStream;
use crate::store::doc::DocStore;
use crate::store::key::KeyStore;
use crate::store::value::ValueStore;
use crate::version;

/// Shared handles of one open collection.
///
/// Owned by the engine; sessions hold an `Arc`. The postings cache lives
/// inside [`PostingsStore`], so invalidation is a method call on a shared
/// handle, never a callback into a session.
#[derive(Debug)]
pub struct SessionContext {
    pub(crate) collection: Collection,
    pub(crate) config: EngineConfig,
    pub(crate) analyzer: Analyzer,
    pub(crate) keys: Arc<KeyStore>,
    pub(crate) values: Arc<ValueStore>,
    pub(crate) docs: Arc<DocStore>,
    pub(crate) postings: Arc<PostingsStore>,
    pub(crate) vec_stream: Arc<AppendStream>,
    last_version: AtomicI64,
}

impl SessionContext {
    /// Open (or create) a collection under the configured data directory.
    pub fn open(config: EngineConfig, name: &str) -> Result<Arc<Self>> {
        let collection = Collection::open(&config.data_dir, name)?;
        let last_published = version::published_versions(&collection)?
            .last()
            .copied()
            .unwrap_or(0);

        let analyzer = Analyzer::new(config.embedding_dimension);
        Ok(Arc::new(Self {
            keys: Arc::new(KeyStore::open(&collection)?),
            values: Arc::new(ValueStore::open(&collection)?),
            docs: Arc::new(DocStore::open(&collection)?),
            postings: Arc::new(PostingsStore::open(&collection)?),
            vec_stream: Arc::new(AppendStream::open(collection.data_path("vec"))?),
            collection,
            config,
            analyzer,
            last_version: AtomicI64::new(last_published),
        }))
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Total documents stored in the collection, all batches included.
    pub fn doc_count(&self) -> u64 {
        self.docs.count()
    }

    /// Claim the next version id, strictly above both the published
    /// history and any id handed out by this process.
    pub(crate) fn claim_version(&self) -> i64 {
        loop {
            let last = self.last_version.load(Ordering::SeqCst);
            let next = version::next_version(last);
            if self
                .last_version
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Reconstitute a stored document, stamping the engine-managed
    /// `__docid` and `__score` fields.
    pub fn materialize(&self, doc_id: u64, score: f32) -> Result<Option<Document>> {
        let Some(doc_map) = self.docs.read(doc_id)? else {
            return Ok(None);
        };

        let mut doc = Document::new();
        for (key_id, value_id) in doc_map {
            let name = self.keys.name(key_id)?;
            let value = self.values.read(value_id)?;
            doc.set(name, value);
        }
        doc.set(FIELD_DOC_ID.to_string(), (doc_id as i64).into());
        doc.set(FIELD_SCORE.to_string(), (score as f64).into());
        Ok(Some(doc))
    }

    /// Read one field of a stored document without materializing the rest.
    pub fn field_value(&self, doc_id: u64, field: &str) -> Result<Option<crate::data::DataValue>> {
        let Some(key_id) = self.keys.lookup(field) else {
            return Ok(None);
        };
        let Some(doc_map) = self.docs.read(doc_id)? else {
            return Ok(None);
        };
        for (stored_key, value_id) in doc_map {
            if stored_key == key_id {
                return Ok(Some(self.values.read(value_id)?));
            }
        }
        Ok(None)
    }
}
