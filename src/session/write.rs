//! The write session and indexing pipeline.
//!
//! A write session owns the collection lock, the six append streams
//! (values, keys, docs and their index files), the vector stream and the
//! per-field term models. Ingest runs through a bounded model-builder
//! queue; flushing drains the queue, optionally runs the validator,
//! serializes every dirty tree in parallel, posts the postings and
//! publishes nothing — publication is `commit()` writing the batch-info
//! file last.
//!
//! # Latches
//!
//! `flush()` is idempotent (a `flushed` flag) and never concurrent with
//! itself (a flush mutex). `put()` after flush is an error.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::analysis::token::AnalyzedString;
use crate::collection::CollectionLock;
use crate::data::{is_engine_field, Document, FIELD_CREATED, FIELD_DOC_ID, FIELD_ORIGINAL};
use crate::engine::config::TermIndexKind;
use crate::error::{ArborError, Result};
use crate::index::trie::TermTrie;
use crate::index::trie_io::encode_trie;
use crate::index::vtree::VectorTree;
use crate::index::vtree_io::write_vtree;
use crate::index::TermModel;
use crate::postings::PostingsAddress;
use crate::session::queue::WorkQueue;
use crate::session::SessionContext;
use crate::version::{self, BatchInfo};

/// One field of one document on its way into a term tree.
struct BuildJob {
    key_id: u64,
    doc_id: u64,
    analyzed: AnalyzedString,
}

type TreeMap = Arc<RwLock<AHashMap<u64, Arc<Mutex<TermModel>>>>>;

/// A write session over one collection, producing one batch version.
pub struct WriteSession {
    context: Arc<SessionContext>,
    _lock: CollectionLock,
    version: i64,
    trees: TreeMap,
    builder: Mutex<Option<WorkQueue<BuildJob>>>,
    pending_validation: Mutex<Vec<BuildJob>>,
    put_lock: Mutex<()>,
    next_doc_id: AtomicU64,
    doc_count: AtomicU64,
    flush_lock: Mutex<()>,
    flushed: AtomicBool,
}

impl std::fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("collection", &self.context.collection().name())
            .field("version", &self.version)
            .field("doc_count", &self.doc_count.load(Ordering::SeqCst))
            .field("flushed", &self.flushed.load(Ordering::SeqCst))
            .finish()
    }
}

impl WriteSession {
    /// Open a write session, acquiring the exclusive collection lock and
    /// claiming the batch version.
    pub fn open(context: Arc<SessionContext>) -> Result<Self> {
        let lock = CollectionLock::acquire(context.collection())?;
        let version = context.claim_version();
        let next_doc_id = context.docs.count();

        let trees: TreeMap = Arc::new(RwLock::new(AHashMap::new()));
        let builder = Self::start_builder(&context, &trees);

        debug!(
            collection = context.collection().name(),
            version, "write session opened"
        );

        Ok(Self {
            context,
            _lock: lock,
            version,
            trees,
            builder: Mutex::new(Some(builder)),
            pending_validation: Mutex::new(Vec::new()),
            put_lock: Mutex::new(()),
            next_doc_id: AtomicU64::new(next_doc_id),
            doc_count: AtomicU64::new(0),
            flushed: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    fn start_builder(context: &Arc<SessionContext>, trees: &TreeMap) -> WorkQueue<BuildJob> {
        let config = context.config().clone();
        let analyzer = context.analyzer().clone();
        let trees = trees.clone();

        WorkQueue::start(
            "model-builder",
            config.queue_capacity,
            config.worker_count,
            move |job: BuildJob| {
                let tree = {
                    let map = trees.read();
                    map.get(&job.key_id).cloned()
                };
                let tree = match tree {
                    Some(tree) => tree,
                    None => trees
                        .write()
                        .entry(job.key_id)
                        .or_insert_with(|| {
                            Arc::new(Mutex::new(match config.index_kind {
                                TermIndexKind::Trie => TermModel::Trie(TermTrie::new()),
                                TermIndexKind::Vector => TermModel::Vector(VectorTree::new(
                                    config.identical_angle,
                                    config.fold_angle,
                                )),
                            }))
                        })
                        .clone(),
                };

                // Inserts into one tree are serialized by its mutex;
                // different trees proceed in parallel.
                let mut model = tree.lock();
                for token in job.analyzed.tokens() {
                    model.insert_token(&analyzer, token, job.doc_id);
                }
                Ok(())
            },
        )
    }

    /// The batch version this session will publish.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Documents put into this session so far.
    pub fn doc_count(&self) -> u64 {
        self.doc_count.load(Ordering::SeqCst)
    }

    /// Ingest one document: assign its doc id, stamp the engine fields,
    /// store values and doc-map, and hand every indexable field to the
    /// model builders.
    pub fn put(&self, mut doc: Document) -> Result<u64> {
        if self.flushed.load(Ordering::SeqCst) {
            return Err(ArborError::invalid_argument(
                "write session already flushed",
            ));
        }

        let _guard = self.put_lock.lock();

        // An upstream __docid is preserved as _original before the engine
        // claims the field.
        if let Some(upstream) = doc.remove(FIELD_DOC_ID) {
            doc.set(FIELD_ORIGINAL.to_string(), upstream);
        }
        if !doc.has_field(FIELD_CREATED) {
            doc.set(FIELD_CREATED.to_string(), chrono::Utc::now().into());
        }

        let doc_id = self.next_doc_id.fetch_add(1, Ordering::SeqCst);

        let mut doc_map = Vec::with_capacity(doc.len());
        for (name, value) in &doc.fields {
            if is_engine_field(name) {
                continue;
            }
            let key_id = self.context.keys.intern(name)?;
            let value_id = self.context.values.append(value)?;
            doc_map.push((key_id, value_id));
        }

        let stored_id = self.context.docs.append(&doc_map)?;
        if stored_id != doc_id {
            return Err(ArborError::misaligned(format!(
                "doc id {doc_id} landed at index slot {stored_id}"
            )));
        }

        for (name, value) in &doc.fields {
            if is_engine_field(name) {
                continue;
            }
            let analyzed = self.context.analyzer.analyze(name, &value.render());
            if analyzed.is_empty() {
                continue;
            }
            let key_id = self.context.keys.intern(name)?;
            if self.context.config.should_validate(name) {
                self.pending_validation.lock().push(BuildJob {
                    key_id,
                    doc_id,
                    analyzed: analyzed.clone(),
                });
            }
            let builder = self.builder.lock();
            let queue = builder
                .as_ref()
                .ok_or_else(|| ArborError::internal("model builder already joined"))?;
            queue.submit(BuildJob {
                key_id,
                doc_id,
                analyzed,
            })?;
        }

        self.doc_count.fetch_add(1, Ordering::SeqCst);
        Ok(doc_id)
    }

    /// Mark a previously committed document as deleted.
    pub fn delete(&self, doc_id: u64) -> Result<()> {
        self.context.docs.delete(doc_id)
    }

    /// Drain the pipeline and serialize this batch's term trees.
    ///
    /// Safe to call twice; the second call is a no-op.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();
        if self.flushed.load(Ordering::SeqCst) {
            return Ok(());
        }

        debug!(version = self.version, "flushing write session");

        if let Some(builder) = self.builder.lock().take() {
            builder.complete_and_join()?;
        }
        self.context.vec_stream.flush()?;

        self.run_validator()?;

        // One column serializer per dirty tree, in parallel.
        let trees: Vec<(u64, Arc<Mutex<TermModel>>)> = self
            .trees
            .read()
            .iter()
            .map(|(key_id, tree)| (*key_id, tree.clone()))
            .collect();
        trees
            .par_iter()
            .map(|(key_id, tree)| self.serialize_column(*key_id, tree))
            .collect::<Result<Vec<()>>>()?;

        self.context.values.flush()?;
        self.context.keys.flush()?;
        self.context.docs.flush()?;
        self.context.postings.flush()?;
        self.context.vec_stream.flush()?;

        // Readers must not serve lists resolved before this batch's
        // appends.
        self.context.postings.invalidate_all();

        self.flushed.store(true, Ordering::SeqCst);
        info!(
            version = self.version,
            docs = self.doc_count.load(Ordering::SeqCst),
            trees = trees.len(),
            "write session flushed"
        );
        Ok(())
    }

    /// Deferred-start validator: re-query every sampled token and fail the
    /// session when a doc id is unreachable.
    fn run_validator(&self) -> Result<()> {
        let jobs = std::mem::take(&mut *self.pending_validation.lock());
        if jobs.is_empty() {
            return Ok(());
        }

        let config = self.context.config();
        let trees = self.trees.clone();
        let analyzer = self.context.analyzer().clone();
        let validator = WorkQueue::start(
            "validator",
            config.queue_capacity,
            config.worker_count,
            move |job: BuildJob| {
                let tree = trees.read().get(&job.key_id).cloned().ok_or_else(|| {
                    ArborError::misaligned(format!("no term tree for key {}", job.key_id))
                })?;
                let model = tree.lock();
                for token in job.analyzed.tokens() {
                    if !model.validate_token(&analyzer, token, job.doc_id) {
                        return Err(ArborError::misaligned(format!(
                            "doc {} unreachable under token '{token}' of key {}",
                            job.doc_id, job.key_id
                        )));
                    }
                }
                Ok(())
            },
        );
        for job in jobs {
            validator.submit(job)?;
        }
        validator.complete_and_join()
    }

    /// Post one tree's postings and serialize it for this version.
    fn serialize_column(&self, key_id: u64, tree: &Arc<Mutex<TermModel>>) -> Result<()> {
        let mut model = tree.lock();
        if model.is_empty() {
            return Ok(());
        }
        let collection = self.context.collection();

        match &mut *model {
            TermModel::Trie(trie) => {
                let payload = trie.postings_payload();
                let frame: Vec<(i64, Vec<u64>)> = payload
                    .iter()
                    .map(|(_, docs)| (-1i64, docs.clone()))
                    .collect();
                let offsets = self.context.postings.write_many(&frame)?;

                let mut addresses = AHashMap::new();
                for ((term, docs), offset) in payload.into_iter().zip(offsets) {
                    addresses.insert(term, PostingsAddress::new(offset, page_length(docs.len())));
                }
                trie.attach_postings(&addresses);

                let field = self.context.keys.name(key_id)?;
                let bytes = encode_trie(trie)?;
                std::fs::write(collection.trie_path(self.version, &field), bytes)?;
            }
            TermModel::Vector(vtree) => {
                let payload = vtree.postings_payload();
                let frame: Vec<(i64, Vec<u64>)> =
                    payload.iter().map(|docs| (-1i64, docs.clone())).collect();
                let offsets = self.context.postings.write_many(&frame)?;

                let addresses: Vec<PostingsAddress> = payload
                    .iter()
                    .zip(offsets)
                    .map(|(docs, offset)| PostingsAddress::new(offset, page_length(docs.len())))
                    .collect();
                vtree.attach_postings(&addresses);

                write_vtree(
                    vtree,
                    &collection.vtree_path(self.version, key_id),
                    &collection.vtree_postings_path(self.version, key_id),
                    &self.context.vec_stream,
                )?;
            }
        }
        Ok(())
    }

    /// Publish the batch: flush if needed, then write the batch-info file
    /// last. Its presence makes the version visible to readers.
    pub fn commit(&self) -> Result<i64> {
        self.flush()?;

        let info = BatchInfo {
            version: self.version,
            doc_count: self.doc_count.load(Ordering::SeqCst),
            compression: None,
            primary_key: self.context.config().primary_key.clone(),
            postings_offset: self.context.postings.len() as i64,
        };
        version::write_batch_info(self.context.collection(), &info)?;

        info!(version = self.version, "batch published");
        Ok(self.version)
    }

    /// Drain, commit and release the lock. Closing is cooperative: work
    /// already accepted is committed, nothing rolls back.
    pub fn close(self) -> Result<i64> {
        self.flush()?;
        self.commit()
    }
}

/// Length of a single-page postings list: header plus body.
fn page_length(doc_count: usize) -> i32 {
    (24 + doc_count * 8) as i32
}
