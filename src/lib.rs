//! # Arbor
//!
//! A document-oriented information-retrieval engine. Records are ingested
//! into named collections, per-field term trees are built on disk, and
//! boolean queries return tf-idf-ranked document lists with a total hit
//! count.
//!
//! The engine carries two index generations: a character trie with exact,
//! prefix, edit-distance and range lookups, and a vector tree whose
//! branching follows cosine-angle similarity between token embeddings.
//! Both feed a paged, append-only postings store.
//!
//! ```rust,no_run
//! use arbor::{Document, Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::with_data_dir("/tmp/arbor")).unwrap();
//! engine
//!     .write(
//!         "movies",
//!         vec![Document::new().add_text("_id", "0").add_text("title", "rambo")],
//!     )
//!     .unwrap();
//! let results = engine.search("movies", "title:'rambo'", 0, 10).unwrap();
//! assert_eq!(results.total, 1);
//! ```

pub mod analysis;
pub mod collection;
pub mod data;
pub mod engine;
pub mod error;
pub mod index;
pub mod postings;
pub mod query;
pub mod session;
pub mod storage;
pub mod store;
pub mod version;

// Re-exports for the public API
pub use analysis::Analyzer;
pub use data::{DataValue, Document};
pub use engine::config::{EngineConfig, TermIndexKind};
pub use engine::Engine;
pub use error::{ArborError, Result};
pub use query::evaluator::{SearchHit, SearchResults};
pub use session::write::WriteSession;
pub use session::SessionContext;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
