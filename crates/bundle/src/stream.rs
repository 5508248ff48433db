use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{BundleError, Result};
use crate::index::Descriptor;
use crate::path::normalize;
use crate::pool::HandlePool;
use crate::AssetBundle;

/// Bounded, read-only, seekable view over one asset.
///
/// The stream checks a handle out of the bundle's [`HandlePool`] and returns
/// it on drop, whatever path led there. Positions are logical: `0` is the
/// first payload byte and [`len`](AssetStream::len) is the end; seeks are
/// clamped into that window.
///
/// A stream borrows its bundle, so the bundle cannot be mutated or closed
/// while any stream is alive.
#[derive(Debug)]
pub struct AssetStream<'a> {
    pool: &'a HandlePool,
    descriptor: Descriptor,
    position: u64,
    handle: Option<File>,
}

impl<'a> AssetStream<'a> {
    /// Opens `path` in `bundle`.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if the path has no live descriptor, or an
    /// I/O error if a handle cannot be opened.
    pub fn new(bundle: &'a AssetBundle, path: &str) -> Result<Self> {
        let key = normalize(path);
        let descriptor = *bundle
            .index
            .get(&key)
            .ok_or_else(|| BundleError::NotFound(key.into_owned()))?;

        let handle = bundle.pool.acquire()?;
        let mut stream = Self {
            pool: &bundle.pool,
            descriptor,
            position: 0,
            handle: Some(handle),
        };
        // pooled handles keep whatever position the last reader left behind
        stream.seek(SeekFrom::Start(0))?;
        Ok(stream)
    }

    /// Logical length of the asset.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.descriptor.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptor.length == 0
    }

    /// Current logical position, always within `[0, len]`.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads from the current position to the end of the asset.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity((self.len() - self.position) as usize);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Always fails: assets cannot be resized through a stream.
    pub fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(BundleError::Unsupported("set_len"))
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::other("asset stream handle already released"))
    }
}

impl Read for AssetStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.descriptor.length - self.position;
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.handle()?.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for AssetStream<'_> {
    /// `SeekFrom::End(n)` resolves to `len + n`. Out-of-range targets are
    /// clamped rather than rejected.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.descriptor.length as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(n) => self.position as i128 + n as i128,
            SeekFrom::End(n) => len + n as i128,
        };
        let position = target.clamp(0, len) as u64;
        let absolute = self.descriptor.offset + position;
        self.handle()?.seek(SeekFrom::Start(absolute))?;
        self.position = position;
        Ok(position)
    }
}

impl Write for AssetStream<'_> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(unsupported("write"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(unsupported("flush"))
    }
}

impl Drop for AssetStream<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}

fn unsupported(op: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, BundleError::Unsupported(op))
}
