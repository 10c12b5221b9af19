//! Append-only payload stores.
//!
//! Three stores share one pattern: an append-only payload file paired with
//! a fixed-stride index file, so a dense id resolves to a block entry in
//! O(1) and the block entry resolves to bytes with one positional read.
//!
//! - [`value`] - typed comparable values (`.val` / `.vix`)
//! - [`key`] - interned field names (`.key` / `.kix`)
//! - [`doc`] - per-document key/value id maps (`.docs` / `.dix`) and the
//!   deleted doc-id set (`.del`)

pub mod doc;
pub mod key;
pub mod value;
