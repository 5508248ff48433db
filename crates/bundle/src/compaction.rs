/// Compaction: removes every trashed range from the payload region.
///
/// Holes are visited in ascending offset order. After hole `i` the running
/// `move_delta` is the total size of holes `0..=i`, and the live block
/// between hole `i` and hole `i + 1` (or `index_offset`) is shifted left by
/// exactly that much. The destination always lies before the source and no
/// compacted region is revisited, so a forward chunked copy is safe and each
/// live byte moves at most once.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info};

use crate::{AssetBundle, BundleError, Result};

impl AssetBundle {
    /// Reclaims all trashed space, rebases live offsets, and truncates the
    /// file to the new end of the payload region.
    ///
    /// Returns the number of bytes reclaimed. With an empty trash this is a
    /// no-op and the file is not touched.
    ///
    /// Runs automatically in [`close`](AssetBundle::close), which also
    /// reclaims the index table left over from the previous session.
    ///
    /// Compaction rewrites payload bytes in place, so once it has moved
    /// anything in a previously persisted bundle only `close()` leaves a
    /// consistent file behind.
    ///
    /// # Errors
    ///
    /// [`BundleError::ReadOnly`], [`BundleError::InvariantViolation`] if the
    /// hole layout would require moving bytes right, or an I/O error. A
    /// failure midway leaves the file partially compacted.
    pub fn compact(&mut self) -> Result<u64> {
        self.ensure_writable()?;
        self.reclaim(false)
    }

    /// Compaction proper. With `fold_stale_table`, the previous session's
    /// index table is reclaimed as one more hole even when the trash is
    /// empty.
    pub(crate) fn reclaim(&mut self, fold_stale_table: bool) -> Result<u64> {
        // zero-sized holes reclaim nothing
        let mut holes: Vec<(u64, u64)> = self
            .index
            .trashed()
            .filter(|d| d.allocated_size > 0)
            .map(|d| (d.offset, d.allocated_size))
            .collect();
        if holes.is_empty() && !(fold_stale_table && self.stale_table.is_some()) {
            self.index.purge_trash();
            return Ok(0);
        }
        if let Some(stale) = self.stale_table.take() {
            holes.push((stale.start, stale.end - stale.start));
        }
        holes.sort_unstable();

        let mut buf = vec![0u8; self.options.copy_chunk_size.max(1)];
        let mut move_delta = 0u64;
        let mut moves = Vec::with_capacity(holes.len());

        for (i, &(offset, size)) in holes.iter().enumerate() {
            move_delta += size;
            let block_begin = offset + size;
            let block_end = holes
                .get(i + 1)
                .map_or(self.index_offset, |&(next, _)| next);
            if block_end < block_begin {
                return Err(BundleError::InvariantViolation(format!(
                    "hole [{}, {}) overlaps the next hole at {}",
                    offset, block_begin, block_end
                )));
            }

            let delta = -i64::try_from(move_delta)
                .map_err(|_| BundleError::TooLarge(move_delta))?;
            move_block(&mut self.file, block_begin, block_end, delta, &mut buf)?;
            moves.push((block_begin..block_end, move_delta));

            debug!(block_begin, block_end, move_delta, "moved block");
        }

        self.index.rebase(&moves);
        self.index.purge_trash();
        self.index_offset -= move_delta;
        self.file.set_len(self.index_offset)?;
        self.modified = true;

        info!(
            holes = holes.len(),
            reclaimed = move_delta,
            index_offset = self.index_offset,
            "compacted bundle"
        );
        Ok(move_delta)
    }
}

/// Copies `[begin, end)` to `[begin + delta, end + delta)` in chunks of
/// `buf.len()` bytes, front to back.
///
/// Only leftward moves (`delta <= 0`) are supported: a forward copy toward
/// higher offsets would overwrite source bytes before reading them.
pub(crate) fn move_block(
    file: &mut File,
    begin: u64,
    end: u64,
    delta: i64,
    buf: &mut [u8],
) -> Result<()> {
    if delta > 0 {
        return Err(BundleError::InvariantViolation(format!(
            "cannot move block [{}, {}) right by {} bytes",
            begin, end, delta
        )));
    }
    let shift = delta.unsigned_abs();
    if shift > begin {
        return Err(BundleError::InvariantViolation(format!(
            "cannot move block at {} left by {} bytes",
            begin, shift
        )));
    }

    let mut src = begin;
    while src < end {
        let n = (buf.len() as u64).min(end - src) as usize;
        file.seek(SeekFrom::Start(src))?;
        file.read_exact(&mut buf[..n])?;
        file.seek(SeekFrom::Start(src - shift))?;
        file.write_all(&buf[..n])?;
        src += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn scratch(contents: &[u8]) -> Result<(tempfile::TempDir, File)> {
        let dir = tempdir()?;
        let path = dir.path().join("block.bin");
        std::fs::write(&path, contents)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok((dir, file))
    }

    #[test]
    fn moves_block_left_in_small_chunks() -> Result<()> {
        let (_dir, mut file) = scratch(b"0123456789abcdef")?;
        let mut buf = [0u8; 3];

        move_block(&mut file, 10, 16, -6, &mut buf)?;

        let mut out = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut out)?;
        assert_eq!(&out[..10], b"0123abcdef");
        Ok(())
    }

    #[test]
    fn overlapping_move_is_correct() -> Result<()> {
        let (_dir, mut file) = scratch(b"xxABCDEFGH")?;
        let mut buf = [0u8; 4];

        move_block(&mut file, 2, 10, -1, &mut buf)?;

        let mut out = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut out)?;
        assert_eq!(&out[..9], b"xABCDEFGH");
        Ok(())
    }

    #[test]
    fn growing_move_is_rejected() -> Result<()> {
        let (_dir, mut file) = scratch(b"0123456789")?;
        let mut buf = [0u8; 4];

        let err = move_block(&mut file, 2, 6, 3, &mut buf).unwrap_err();
        assert!(matches!(err, BundleError::InvariantViolation(_)));
        Ok(())
    }

    #[test]
    fn empty_block_is_a_no_op() -> Result<()> {
        let (dir, mut file) = scratch(b"0123")?;
        let mut buf = [0u8; 4];
        move_block(&mut file, 4, 4, -2, &mut buf)?;
        assert_eq!(std::fs::metadata(dir.path().join("block.bin"))?.len(), 4);
        Ok(())
    }
}
