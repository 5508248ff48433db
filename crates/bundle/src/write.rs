/// Write path: `import_file()` and `delete_file()`.
///
/// Imports either overwrite an asset's existing slot in place (when the new
/// content fits its slack window) or append a fresh slot at `index_offset`
/// and trash the old one. Deletes only move the descriptor to the trash;
/// bytes are reclaimed at close. Every successful mutation marks the bundle
/// modified so that `close()` persists it.
///
/// There is no rollback: a failed import leaves whatever index changes it
/// already made.
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use crate::format::{now_millis, MAX_FILE_OFFSET};
use crate::{normalize, AssetBundle, BundleError, Descriptor, Result};

impl AssetBundle {
    /// Stores `bytes` under `path`, reserving `reserve` zeroed bytes after
    /// them for future in-place growth.
    ///
    /// # Placement
    ///
    /// - If `path` already has a slot with
    ///   `bytes.len() <= allocated_size <= bytes.len() + reserve`, the slot
    ///   is rewritten in place: same offset, new length and time, remaining
    ///   slack re-zeroed.
    /// - Otherwise any existing slot is trashed and a new one of
    ///   `bytes.len() + reserve` bytes is appended at `index_offset`.
    ///
    /// # Errors
    ///
    /// [`BundleError::ReadOnly`], [`BundleError::TooLarge`] if the payload
    /// would outgrow 32-bit offsets, or an I/O error.
    pub fn import_file(&mut self, path: &str, bytes: &[u8], reserve: u64) -> Result<()> {
        self.ensure_writable()?;
        let key = normalize(path).into_owned();
        let length = bytes.len() as u64;

        if let Some(existing) = self.index.get(&key).copied() {
            if existing.fits_in_place(length, reserve) {
                let updated = Descriptor {
                    time: now_millis(),
                    length,
                    ..existing
                };
                self.index.replace(&key, updated);
                self.modified = true;
                self.write_payload(existing.offset, bytes, updated.slack())?;
                debug!(path = %key, offset = existing.offset, length, "imported in place");
                return Ok(());
            }
        }

        let allocated_size = length
            .checked_add(reserve)
            .ok_or(BundleError::TooLarge(u64::MAX))?;
        let new_end = self
            .index_offset
            .checked_add(allocated_size)
            .ok_or(BundleError::TooLarge(u64::MAX))?;
        if new_end > MAX_FILE_OFFSET {
            return Err(BundleError::TooLarge(new_end));
        }

        if let Some(old) = self.index.trash(&key) {
            debug!(path = %key, offset = old.offset, size = old.allocated_size, "trashed previous slot");
        }

        let descriptor = Descriptor {
            time: now_millis(),
            offset: self.index_offset,
            length,
            allocated_size,
        };
        self.index.insert(key.clone(), descriptor);
        self.index_offset = new_end;
        self.modified = true;
        self.write_payload(descriptor.offset, bytes, reserve)?;

        debug!(path = %key, offset = descriptor.offset, length, reserve, "imported at tail");
        Ok(())
    }

    /// Imports everything `reader` yields under `path`.
    ///
    /// The source is buffered in memory first, since placement depends on
    /// the final length.
    pub fn import_reader<R: Read>(&mut self, path: &str, mut reader: R, reserve: u64) -> Result<()> {
        self.ensure_writable()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.import_file(path, &bytes, reserve)
    }

    /// Imports the contents of the local file `src` under `path`.
    pub fn import_file_from_path<P: AsRef<Path>>(
        &mut self,
        path: &str,
        src: P,
        reserve: u64,
    ) -> Result<()> {
        self.ensure_writable()?;
        let bytes = fs::read(src)?;
        self.import_file(path, &bytes, reserve)
    }

    /// Removes `path` from the index and queues its slot for reclamation.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if `path` has no live descriptor,
    /// [`BundleError::ReadOnly`] on a read-only bundle.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        self.ensure_writable()?;
        let key = normalize(path);
        let d = self
            .index
            .trash(&key)
            .ok_or_else(|| BundleError::NotFound(key.clone().into_owned()))?;
        self.modified = true;
        debug!(path = %key, offset = d.offset, size = d.allocated_size, "deleted");
        Ok(())
    }

    /// Writes `bytes` at `offset` followed by `zero_fill` zero bytes.
    fn write_payload(&mut self, offset: u64, bytes: &[u8], zero_fill: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        if zero_fill > 0 {
            io::copy(&mut io::repeat(0).take(zero_fill), &mut self.file)?;
        }
        Ok(())
    }
}
