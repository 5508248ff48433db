use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{AssetBundle, OpenMode};

/// Path of a not-yet-existing bundle inside `dir`.
pub fn bundle_path(dir: &TempDir) -> PathBuf {
    dir.path().join("assets.bundle")
}

pub fn open_rw(path: &Path) -> AssetBundle {
    AssetBundle::open(path, OpenMode::Writable).unwrap()
}

pub fn open_ro(path: &Path) -> AssetBundle {
    AssetBundle::open(path, OpenMode::ReadOnly).unwrap()
}

/// Deterministic, non-repeating-looking payload so shifted bytes are caught.
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_mul(31).wrapping_add((i % 251) as u8))
        .collect()
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

/// Asserts that no two live descriptors overlap and all sit in the payload region.
pub fn assert_disjoint(bundle: &AssetBundle) {
    let mut ranges: Vec<(u64, u64, String)> = bundle
        .enumerate_files()
        .into_iter()
        .map(|name| {
            let d = bundle.descriptor(&name).unwrap();
            (d.offset, d.end(), name)
        })
        .collect();
    ranges.sort();
    for (begin, end, name) in &ranges {
        assert!(*begin >= crate::format::HEADER_SIZE, "{} starts inside header", name);
        assert!(*end <= bundle.index_offset(), "{} runs past index_offset", name);
    }
    for pair in ranges.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "{} [{}, {}) overlaps {} [{}, {})",
            pair[0].2,
            pair[0].0,
            pair[0].1,
            pair[1].2,
            pair[1].0,
            pair[1].1
        );
    }
}
