//! The engine facade.
//!
//! An [`Engine`] owns one context per opened collection and exposes the
//! whole surface the thin HTTP front end needs: payload ingestion through
//! the media-type registry, query search, deletion and maintenance.

pub mod config;

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::analysis::registry::MediaRegistry;
use crate::data::Document;
use crate::engine::config::EngineConfig;
use crate::error::Result;
use crate::query::evaluator::{self, SearchResults};
use crate::session::write::WriteSession;
use crate::session::SessionContext;
use crate::version;

/// The embedded engine: collections, sessions, search.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: MediaRegistry,
    contexts: RwLock<AHashMap<String, Arc<SessionContext>>>,
}

impl Engine {
    /// Create an engine rooted at the configured data directory.
    pub fn new(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            registry: MediaRegistry::with_defaults(),
            contexts: RwLock::new(AHashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &MediaRegistry {
        &self.registry
    }

    /// The shared context of a collection, opened on first use.
    pub fn context(&self, collection: &str) -> Result<Arc<SessionContext>> {
        if let Some(context) = self.contexts.read().get(collection) {
            return Ok(context.clone());
        }
        let mut contexts = self.contexts.write();
        if let Some(context) = contexts.get(collection) {
            return Ok(context.clone());
        }
        let context = SessionContext::open(self.config.clone(), collection)?;
        contexts.insert(collection.to_string(), context.clone());
        Ok(context)
    }

    /// Open a write session; fails with `ConflictingWrite` while another
    /// writer holds the collection.
    pub fn open_write_session(&self, collection: &str) -> Result<WriteSession> {
        WriteSession::open(self.context(collection)?)
    }

    /// Ingest a batch of documents and publish it. Returns the version.
    pub fn write(&self, collection: &str, documents: Vec<Document>) -> Result<i64> {
        let session = self.open_write_session(collection)?;
        for document in documents {
            session.put(document)?;
        }
        session.close()
    }

    /// Ingest an encoded payload; the media type selects the codec.
    pub fn write_payload(
        &self,
        collection: &str,
        media_type: &str,
        payload: &[u8],
    ) -> Result<i64> {
        let codec = self.registry.resolve(media_type)?;
        let documents = codec.decode(payload)?;
        self.write(collection, documents)
    }

    /// Evaluate a query across all published batches.
    pub fn search(
        &self,
        collection: &str,
        query: &str,
        skip: usize,
        take: usize,
    ) -> Result<SearchResults> {
        evaluator::search(&self.context(collection)?, query, skip, take)
    }

    /// Mark a document deleted; reads skip it from then on.
    pub fn delete(&self, collection: &str, doc_id: u64) -> Result<()> {
        self.context(collection)?.docs.delete(doc_id)
    }

    /// Bytes held by unpublished (crashed) batches.
    pub fn dead_bytes(&self, collection: &str) -> Result<u64> {
        version::dead_bytes(self.context(collection)?.collection())
    }

    /// Reclaim the files of unpublished batches.
    pub fn vacuum(&self, collection: &str) -> Result<u64> {
        let context = self.context(collection)?;
        let reclaimed = version::vacuum(context.collection())?;
        context.postings.invalidate_all();
        Ok(reclaimed)
    }
}
