/// Read path: `open_file()`, point lookups, enumeration, and stats.
///
/// Everything here takes `&self` and only reads the in-memory index, except
/// the asset streams, which borrow a pooled handle each.
use std::time::SystemTime;

use crate::{normalize, AssetBundle, AssetStream, BundleError, Descriptor, Result};

/// Snapshot of space usage inside a bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleStats {
    pub live_assets: usize,
    pub trashed_assets: usize,
    /// Sum of logical lengths of live assets.
    pub live_bytes: u64,
    /// Reserved-but-unused bytes inside live slots.
    pub slack_bytes: u64,
    /// Bytes held by trashed slots plus the previous session's index table,
    /// all reclaimed at close.
    pub trashed_bytes: u64,
    pub index_offset: u64,
}

impl AssetBundle {
    /// Opens a bounded read stream over the asset at `path`.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if the path has no live descriptor.
    pub fn open_file(&self, path: &str) -> Result<AssetStream<'_>> {
        AssetStream::new(self, path)
    }

    /// Reads the whole asset at `path` into memory.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut stream = self.open_file(path)?;
        Ok(stream.read_to_vec()?)
    }

    #[must_use]
    pub fn file_exists(&self, path: &str) -> bool {
        self.index.contains(&normalize(path))
    }

    /// Returns a copy of the live descriptor for `path`, if any.
    #[must_use]
    pub fn descriptor(&self, path: &str) -> Option<Descriptor> {
        self.index.get(&normalize(path)).copied()
    }

    pub fn get_file_last_write_time(&self, path: &str) -> Result<SystemTime> {
        self.require(path).map(|d| d.time)
    }

    /// Logical length of the asset at `path`.
    pub fn get_file_size(&self, path: &str) -> Result<u64> {
        self.require(path).map(|d| d.length)
    }

    /// All live asset paths, in no particular order.
    #[must_use]
    pub fn enumerate_files(&self) -> Vec<String> {
        self.index.live().map(|(name, _)| name.to_string()).collect()
    }

    /// Live asset paths starting with `prefix` (normalized first).
    #[must_use]
    pub fn enumerate_files_with_prefix(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        self.index
            .live()
            .filter(|(name, _)| name.starts_with(prefix.as_ref()))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Number of live assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> BundleStats {
        let mut stats = BundleStats {
            live_assets: self.index.len(),
            trashed_assets: self.index.trashed_len(),
            index_offset: self.index_offset,
            ..BundleStats::default()
        };
        for (_, d) in self.index.live() {
            stats.live_bytes += d.length;
            stats.slack_bytes += d.slack();
        }
        stats.trashed_bytes = self.index.trashed().map(|d| d.allocated_size).sum::<u64>()
            + self.stale_table.as_ref().map_or(0, |r| r.end - r.start);
        stats
    }

    fn require(&self, path: &str) -> Result<Descriptor> {
        let key = normalize(path);
        self.index
            .get(&key)
            .copied()
            .ok_or_else(|| BundleError::NotFound(key.into_owned()))
    }
}
