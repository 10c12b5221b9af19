//! Low-level file primitives.
//!
//! The engine writes through [`AppendStream`]s: named files that only ever
//! grow at the tail and answer positional, stateless reads. Pointer words
//! inside already-written pages (postings chain maintenance) are patched
//! through [`AppendStream::patch_i64`]; page bodies are never rewritten.
//!
//! # Modules
//!
//! - [`block`] - fixed-width block entries, varint and UTF-16 value codecs

pub mod block;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{ArborError, Result};

/// An append-only file with positional reads.
///
/// `append` returns the byte offset the payload landed at. Concurrent
/// appenders must be serialized by the caller; the internal mutex only
/// protects the single file handle's seek position.
#[derive(Debug)]
pub struct AppendStream {
    path: PathBuf,
    file: Mutex<File>,
    len: Mutex<u64>,
}

impl AppendStream {
    /// Open (or create) the named file for appending and positional reads.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = with_retry(|| {
            OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
        })?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file: Mutex::new(file),
            len: Mutex::new(len),
        })
    }

    /// The file path this stream writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length in bytes.
    pub fn len(&self) -> u64 {
        *self.len.lock()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `bytes` at the tail, returning the offset they start at.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut len = self.len.lock();
        let offset = *len;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        *len += bytes.len() as u64;
        Ok(offset)
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&self) -> Result<()> {
        self.file.lock().flush()?;
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    ///
    /// A short read is a broken invariant: the offset/length pair came from
    /// an index file that promised the bytes exist.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                ArborError::misaligned(format!(
                    "short read at offset {offset} (+{}) in {}",
                    buf.len(),
                    self.path.display()
                ))
            } else {
                ArborError::Io(err)
            }
        })
    }

    /// Overwrite a single i64 word at `offset`.
    ///
    /// Only postings chain pointers (`next_page_offset`, `last_page_offset`)
    /// are ever patched; everything else in the file is immutable.
    pub fn patch_i64(&self, offset: u64, value: i64) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&value.to_be_bytes())?;
        Ok(())
    }
}

/// Issue an IO operation, retrying once when the failure is transient.
///
/// `Interrupted` and `WouldBlock` are the transient kinds; anything else is
/// surfaced immediately.
pub fn with_retry<T>(mut op: impl FnMut() -> std::io::Result<T>) -> Result<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ) =>
        {
            op().map_err(ArborError::Io)
        }
        Err(err) => Err(ArborError::Io(err)),
    }
}
