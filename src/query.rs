//! The query language.
//!
//! One statement per line, each a boolean-prefixed `key:value` term:
//!
//! ```text
//! +title:'the'
//! -title:'ugly'
//! year>1980
//! ```
//!
//! - [`parser`] - statement parsing into the query-node chain
//! - [`evaluator`] - per-batch evaluation, composition, top-k
//! - [`score`] - tf-idf weighting

pub mod evaluator;
pub mod parser;
pub mod score;
