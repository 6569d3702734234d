//! Error types shared across the storage engine.
//!
//! Follows the same layering idea as the teacher's error hierarchy
//! (`BlockLayerError` wrapping `APIError`, `InodeLayerError` wrapping
//! `BlockLayerError`, and so on): each component of the engine has its own
//! failure modes, and they all fold into a single top-level [`Error`] that
//! callers match against. Operations that take a path return a [`PathError`]
//! so the caller always knows which member an error was about.

use std::fmt;
use thiserror::Error;

/// Errors surfaced by the storage engine.
///
/// This is the taxonomy described in the design: every public operation
/// returns one of these kinds, or success, never a partial result.
#[derive(Error, Debug)]
pub enum Error {
    /// The archive file already exists where [`crate::Archive::create`] expected it not to,
    /// or a member already exists where `O_EXCL`/`rename` expected it not to.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The archive file, or the named member, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `chdir` was attempted on a file handle. Members are never directories.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// I/O was attempted on a handle that has already been closed.
    #[error("cannot read/write on a closed file")]
    ClosedFile,

    /// A read was attempted on a handle opened without read permission.
    #[error("cannot read from a write-only file")]
    NonReadable,

    /// A write was attempted on a handle opened without write permission.
    #[error("cannot write to a non-writable file")]
    NonWritable,

    /// The in-memory buffer accepted fewer bytes than were requested.
    #[error("short write: {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes actually written.
        written: usize,
        /// Bytes requested to be written.
        requested: usize,
    },

    /// The inode record's signature, length, or version field was malformed.
    #[error("corrupt inode: {0}")]
    CorruptInode(&'static str),

    /// Fewer payload bytes were available than the inode's `size` field promised.
    #[error("unable to read file: expected {expected} bytes, got {actual}")]
    UnableToRead {
        /// Bytes the inode claims the payload should contain.
        expected: u64,
        /// Bytes actually recovered from the block stream.
        actual: u64,
    },

    /// A failure propagated from the embedded key/value store or the block codec.
    #[error("storage engine error")]
    Io(#[from] StorageError),
}

/// Failures propagated from the `redb`-backed key/value store.
///
/// `redb` has a handful of distinct error types depending on which stage of
/// a transaction failed; this wraps all of them behind one variant set so
/// the rest of the engine can use `?` without caring which one fired.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create or open the backing database file.
    #[error("failed to open archive database")]
    Database(#[from] redb::DatabaseError),
    /// Failed to begin a read or write transaction.
    #[error("failed to begin transaction")]
    Transaction(#[from] redb::TransactionError),
    /// Failed to open, create, or range over a table inside a transaction.
    #[error("failed to access table")]
    Table(#[from] redb::TableError),
    /// A lower-level storage failure (page allocation, checksum, ...).
    #[error("storage failure")]
    Storage(#[from] redb::StorageError),
    /// Failed to commit a write transaction.
    #[error("failed to commit transaction")]
    Commit(#[from] redb::CommitError),
    /// The block compression codec failed to decode a stored block.
    #[error("block codec error: {0}")]
    Codec(String),
}

/// A path-qualified error, mirroring `os.PathError`: every operation that
/// accepts a member path wraps its underlying error together with the
/// operation name and the path it was acting on.
#[derive(Debug)]
pub struct PathError {
    /// Name of the operation that failed, e.g. `"open"`, `"stat"`, `"rename"`.
    pub operation: &'static str,
    /// The member path the operation was acting on.
    pub path: String,
    /// The underlying cause.
    pub source: Error,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.operation, self.path, self.source)
    }
}

impl std::error::Error for PathError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl PathError {
    /// Wrap `source` as having occurred during `operation` on `path`.
    pub fn new(operation: &'static str, path: impl Into<String>, source: Error) -> PathError {
        PathError {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Shorthand for a `Result` using this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for a `Result` using the path-qualified [`PathError`] type.
pub type PathResult<T> = std::result::Result<T, PathError>;
