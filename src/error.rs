//! Error types for the Arbor engine.

use std::fmt;

/// The crate-wide error type.
///
/// The variants mirror the failure classes of the engine: malformed
/// queries surface as `Parse`, missing media plugins as `NotSupported`,
/// broken on-disk invariants as `DataMisaligned` (always fatal for the
/// current session), filesystem trouble as `Io`, and lock contention on a
/// collection as `ConflictingWrite`.
#[derive(Debug)]
pub enum ArborError {
    /// Malformed query string.
    Parse(String),

    /// Unknown media type or missing plugin.
    NotSupported(String),

    /// An internal invariant was broken (duplicate doc-id in a posting
    /// list, validator miss, invalid postings offset). Fatal; the session
    /// must be abandoned. On-disk state stays consistent up to the last
    /// published batch.
    DataMisaligned(String),

    /// Underlying filesystem error.
    Io(std::io::Error),

    /// The collection lock is held by another writer.
    ConflictingWrite(String),

    /// A caller-supplied argument was invalid.
    InvalidArgument(String),

    /// Catch-all for internal faults that are not invariant violations.
    Internal(String),
}

impl ArborError {
    /// Create a parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        ArborError::Parse(msg.into())
    }

    /// Create a not-supported error.
    pub fn not_supported<S: Into<String>>(msg: S) -> Self {
        ArborError::NotSupported(msg.into())
    }

    /// Create a data-misaligned error.
    pub fn misaligned<S: Into<String>>(msg: S) -> Self {
        ArborError::DataMisaligned(msg.into())
    }

    /// Create a conflicting-write error.
    pub fn conflicting_write<S: Into<String>>(msg: S) -> Self {
        ArborError::ConflictingWrite(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        ArborError::InvalidArgument(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ArborError::Internal(msg.into())
    }

    /// Whether the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArborError::DataMisaligned(_))
    }
}

impl fmt::Display for ArborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArborError::Parse(msg) => write!(f, "parse error: {msg}"),
            ArborError::NotSupported(msg) => write!(f, "not supported: {msg}"),
            ArborError::DataMisaligned(msg) => write!(f, "data misaligned: {msg}"),
            ArborError::Io(err) => write!(f, "io error: {err}"),
            ArborError::ConflictingWrite(msg) => write!(f, "conflicting write: {msg}"),
            ArborError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ArborError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ArborError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArborError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ArborError {
    fn from(err: std::io::Error) -> Self {
        ArborError::Io(err)
    }
}

impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        ArborError::Internal(format!("json: {err}"))
    }
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, ArborError>;
