//! # Bundle - Packed Asset Container
//!
//! A single-file store holding many named binary assets behind a flat,
//! string-keyed namespace.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (12 bytes)                                             │
//! │ signature (u32 = 0x13AF) | reserved (u32 = 0) | index_offset  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ PAYLOAD [12, index_offset)                                    │
//! │                                                               │
//! │ asset bytes [offset, offset + length)                         │
//! │ zeroed slack [offset + length, offset + allocated_size)       │
//! │ ... holes left by deleted/relocated assets until compaction   │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX TABLE (at index_offset)                                 │
//! │ count (u32) | repeated: name | time | offset | length | alloc │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. See [`format`] for the exact encoding.
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                |
//! |----------------|--------------------------------------------------------|
//! | `lib.rs`       | `AssetBundle` struct, open/close, accessors, `Drop`     |
//! | [`write`]      | `import_file()`, `delete_file()`                        |
//! | [`read`]       | `open_file()`, lookups, enumeration, stats              |
//! | [`compaction`] | block move + offset rebase over trashed ranges          |
//! | [`index`]      | descriptor arena (live + trashed slots)                 |
//! | [`pool`]       | LIFO pool of read handles                               |
//! | [`stream`]     | bounded `Read + Seek` view over one asset               |
//!
//! ## Lifecycle
//!
//! Mutations only touch the in-memory index (plus the payload bytes an
//! import writes). Holes are reclaimed and the index table persisted once,
//! in [`AssetBundle::close`]. Nothing in between is crash-safe.
//!
//! A reopened writable bundle appends after the previous index table and
//! leaves it intact until `close()` reclaims it. Dropping a bundle without
//! `close()` therefore discards the session: the file is cut back to its
//! persisted length and the old header and table still describe it. Bytes
//! rewritten in place inside an existing slot, and anything moved by an
//! explicit [`AssetBundle::compact`], are the exception.
//!
//! ## Concurrency
//!
//! Mutating methods take `&mut self`, reads take `&self`. Any number of
//! threads may hold [`AssetStream`]s from a shared `&AssetBundle`; each
//! stream owns one pooled handle while it lives.
pub mod format;

mod compaction;
mod error;
mod index;
mod path;
mod pool;
mod read;
mod stream;
mod write;

pub use error::{BundleError, Result};
pub use index::Descriptor;
pub use path::normalize;
pub use pool::HandlePool;
pub use read::BundleStats;
pub use stream::AssetStream;

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use format::HEADER_SIZE;
use index::Index;
use tracing::{debug, info, warn};

/// Default chunk size for compaction block moves (4 KiB).
pub const DEFAULT_COPY_CHUNK_SIZE: usize = 4096;

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Lookups and reads only. The file must exist.
    ReadOnly,
    /// Reads, imports, deletes. The file is created if missing.
    Writable,
}

impl OpenMode {
    #[must_use]
    pub fn is_writable(self) -> bool {
        self == OpenMode::Writable
    }
}

/// Tuning knobs for an open bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Buffer size used when compaction shifts live bytes left.
    pub copy_chunk_size: usize,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            copy_chunk_size: DEFAULT_COPY_CHUNK_SIZE,
        }
    }
}

/// An open packed-asset bundle.
pub struct AssetBundle {
    pub(crate) path: PathBuf,
    pub(crate) mode: OpenMode,
    /// Primary handle; read-write when the bundle is writable.
    pub(crate) file: File,
    pub(crate) index: Index,
    /// Start of the persisted index table and end of the payload region.
    pub(crate) index_offset: u64,
    pub(crate) pool: HandlePool,
    pub(crate) options: BundleOptions,
    /// Set by any change that `close()` has to persist.
    pub(crate) modified: bool,
    /// Previous session's index table, kept readable until close.
    pub(crate) stale_table: Option<Range<u64>>,
    /// File length as last persisted; a discarded session is cut back to it.
    persisted_len: u64,
    closed: bool,
}

impl std::fmt::Debug for AssetBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetBundle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("index_offset", &self.index_offset)
            .field("live_assets", &self.index.len())
            .field("trashed_assets", &self.index.trashed_len())
            .field("pooled_handles", &self.pool.pooled_count())
            .field("copy_chunk_size", &self.options.copy_chunk_size)
            .field("modified", &self.modified)
            .finish()
    }
}

impl AssetBundle {
    /// Opens the bundle at `path` with default options.
    ///
    /// See [`open_with`](AssetBundle::open_with).
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, BundleOptions::default())
    }

    /// Opens the bundle at `path`.
    ///
    /// An empty (or, when writable, newly created) file starts as an empty
    /// bundle whose payload begins right after the header. Otherwise the
    /// header is validated and the index table loaded.
    ///
    /// # Errors
    ///
    /// - [`BundleError::CorruptBundle`] on a signature mismatch or a
    ///   malformed header / index table.
    /// - [`BundleError::Io`] if the file cannot be opened or read (including
    ///   a read-only open of a missing file).
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        options: BundleOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::Writable => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?,
            OpenMode::ReadOnly => File::open(&path)?,
        };

        let persisted_len = file.metadata()?.len();
        let (table_offset, index) = Self::read_index_table(&path, &file)?;

        // new payload goes after the old table so it stays valid until close
        let (index_offset, stale_table) = if mode.is_writable() && persisted_len > 0 {
            (persisted_len, Some(table_offset..persisted_len))
        } else {
            (table_offset, None)
        };

        info!(
            path = %path.display(),
            ?mode,
            assets = index.len(),
            index_offset,
            "opened bundle"
        );

        Ok(Self {
            pool: HandlePool::new(&path),
            path,
            mode,
            file,
            index,
            index_offset,
            options,
            // a brand-new file has no header yet
            modified: mode.is_writable() && persisted_len == 0,
            stale_table,
            persisted_len,
            closed: false,
        })
    }

    /// Compacts and persists the index table if anything changed, then
    /// releases every pooled handle.
    ///
    /// Consumes the bundle, so it cannot be used or closed again. An
    /// unmodified bundle is left byte-for-byte untouched, mtime included.
    ///
    /// # Errors
    ///
    /// Propagates compaction and I/O failures. An interruption here can
    /// leave the payload, header, and index table mutually inconsistent.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = if self.mode.is_writable() && self.modified {
            self.reclaim(true).and_then(|_| self.write_index_table())
        } else {
            Ok(())
        };
        self.release();

        if result.is_ok() {
            info!(path = %self.path.display(), "closed bundle");
        }
        result
    }

    /// Whether there are changes that `close()` would persist.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current end of the payload region.
    #[must_use]
    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }

    /// Number of idle handles in the reader pool.
    #[must_use]
    pub fn pooled_handle_count(&self) -> usize {
        self.pool.pooled_count()
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(BundleError::ReadOnly)
        }
    }

    fn release(&mut self) {
        self.pool.clear();
        self.index.clear();
    }

    /// Throws away the session's unsaved changes.
    ///
    /// Tail appends are cut off by restoring the persisted length. This is
    /// only sound while the previous index table is still in place (or the
    /// file started empty); after compaction has moved bytes the file is
    /// left as is.
    fn discard(&mut self) -> io::Result<()> {
        if !(self.mode.is_writable() && self.modified) {
            return Ok(());
        }
        if self.stale_table.is_some() || self.persisted_len == 0 {
            warn!(path = %self.path.display(), "bundle dropped without close, discarding changes");
            self.file.set_len(self.persisted_len)
        } else {
            warn!(
                path = %self.path.display(),
                "bundle dropped without close after compaction, on-disk index is stale"
            );
            Ok(())
        }
    }

    /// Loads the header and index table. Returns `(index_offset, index)`.
    fn read_index_table(path: &Path, file: &File) -> Result<(u64, Index)> {
        let filesize = file.metadata()?.len();
        if filesize == 0 {
            return Ok((HEADER_SIZE, Index::new()));
        }

        let corrupt = |reason: String| BundleError::CorruptBundle {
            path: path.to_path_buf(),
            reason,
        };

        if filesize < HEADER_SIZE {
            return Err(corrupt(format!(
                "file is {} bytes, smaller than the {}-byte header",
                filesize, HEADER_SIZE
            )));
        }

        let mut r = BufReader::new(file);
        r.seek(SeekFrom::Start(0))?;
        let header = format::read_header(&mut r)?;
        if header.signature != format::SIGNATURE {
            return Err(corrupt(format!(
                "signature {:#x} does not match {:#x}",
                header.signature,
                format::SIGNATURE
            )));
        }

        let index_offset = header.index_offset as u64;
        if index_offset < HEADER_SIZE || index_offset > filesize {
            return Err(corrupt(format!(
                "index_offset {} outside [{}, {}]",
                index_offset, HEADER_SIZE, filesize
            )));
        }

        r.seek(SeekFrom::Start(index_offset))?;
        let mut index = Index::new();
        let parsed = (|| -> io::Result<Option<String>> {
            let count = r.read_u32::<LittleEndian>()?;
            for _ in 0..count {
                let (name, d) = format::read_record(&mut r)?;
                if d.length > d.allocated_size
                    || d.offset < HEADER_SIZE
                    || d.end() > index_offset
                {
                    return Ok(Some(format!("descriptor for '{}' is out of bounds", name)));
                }
                if !index.insert(name.clone(), d) {
                    return Ok(Some(format!("duplicate index entry '{}'", name)));
                }
            }
            Ok(None)
        })();

        match parsed {
            Ok(None) => Ok((index_offset, index)),
            Ok(Some(reason)) => Err(corrupt(reason)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                ) =>
            {
                Err(corrupt(format!("malformed index table: {}", e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the header and the full index table, then trims anything past
    /// the table left over from an older, longer layout.
    fn write_index_table(&mut self) -> Result<()> {
        let index_offset = format::to_u32(self.index_offset)?;

        let mut w = BufWriter::new(&self.file);
        w.seek(SeekFrom::Start(0))?;
        format::write_header(&mut w, index_offset)?;

        w.seek(SeekFrom::Start(self.index_offset))?;
        w.write_u32::<LittleEndian>(format::to_u32(self.index.len() as u64)?)?;
        for (name, d) in self.index.live() {
            format::write_record(&mut w, name, d)?;
        }
        w.flush()?;
        let end = w.stream_position()?;
        drop(w);

        self.file.set_len(end)?;
        self.file.sync_all()?;

        debug!(
            assets = self.index.len(),
            index_offset = self.index_offset,
            file_len = end,
            "wrote index table"
        );
        Ok(())
    }
}

/// Dropping without [`AssetBundle::close`] persists nothing.
///
/// The session's changes are discarded and pooled handles released, so a
/// caller that hit an error midway can reopen the bundle in its last
/// persisted state.
impl Drop for AssetBundle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.discard() {
            warn!(path = %self.path.display(), error = %e, "failed to discard unsaved changes");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests;
