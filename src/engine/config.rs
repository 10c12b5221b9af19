//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which term-index generation a collection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermIndexKind {
    /// Character trie with exact/prefix/near/range lookups.
    Trie,
    /// Cosine-angle vector tree with closest-match lookup.
    Vector,
}

/// Configuration for an [`Engine`](crate::engine::Engine).
///
/// The data directory is the only setting the environment must provide;
/// everything else has workable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for all collection files.
    pub data_dir: PathBuf,

    /// Term-index generation for new batches.
    pub index_kind: TermIndexKind,

    /// Model-builder worker count.
    pub worker_count: usize,

    /// Bound of the model-builder queue.
    pub queue_capacity: usize,

    /// Fields the write-side validator re-queries after indexing.
    /// `None` disables validation.
    pub validate_fields: Option<Vec<String>>,

    /// Cosine threshold at or above which two embeddings are the same term.
    pub identical_angle: f32,

    /// Cosine threshold separating descend from branch in the vector tree.
    pub fold_angle: f32,

    /// Edit budget for `~` fuzzy queries.
    pub default_max_edits: u32,

    /// Dimension of the token embeddings.
    pub embedding_dimension: usize,

    /// Field whose value identifies a record across versions; later
    /// versions shadow earlier ones on match.
    pub primary_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: PathBuf::from("./data"),
            index_kind: TermIndexKind::Trie,
            worker_count: 4,
            queue_capacity: 1024,          // Ingest blocks when full
            validate_fields: None,
            identical_angle: 0.999,
            fold_angle: 0.55,
            default_max_edits: 2,
            embedding_dimension: 64,
            primary_key: Some("_id".to_string()),
        }
    }
}

impl EngineConfig {
    /// A config rooted at `data_dir` with defaults for everything else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Whether the validator should re-query `field` after indexing.
    pub fn should_validate(&self, field: &str) -> bool {
        self.validate_fields
            .as_ref()
            .is_some_and(|fields| fields.iter().any(|f| f == field))
    }
}
