use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by bundle operations.
///
/// I/O failures are propagated unchanged through [`BundleError::Io`]; this
/// layer never retries.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Read, delete, or stat on a path with no live descriptor.
    #[error("asset '{0}' doesn't exist")]
    NotFound(String),

    /// The header signature did not match, or the index table is malformed.
    #[error("bundle at {path:?} is corrupted: {reason}")]
    CorruptBundle { path: PathBuf, reason: String },

    /// A write-style call on a read-only asset stream.
    #[error("unsupported operation on asset stream: {0}")]
    Unsupported(&'static str),

    /// An internal invariant was broken (e.g. compaction asked to grow).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A mutation was attempted on a bundle opened with [`OpenMode::ReadOnly`].
    ///
    /// [`OpenMode::ReadOnly`]: crate::OpenMode::ReadOnly
    #[error("bundle was opened read-only")]
    ReadOnly,

    /// The payload region would grow past the 32-bit offsets of the format.
    #[error("bundle would grow to {0} bytes, beyond the 32-bit offset limit")]
    TooLarge(u64),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BundleError>;
