use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// LIFO pool of read-only handles onto the bundle file.
///
/// Readers check a handle out, use it exclusively, and check it back in, so
/// the only contended section is the push/pop itself. Handles are closed
/// only when the pool is cleared or dropped.
#[derive(Debug)]
pub struct HandlePool {
    path: PathBuf,
    handles: Mutex<Vec<File>>,
}

impl HandlePool {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Pops the most recently released handle, or opens a fresh one.
    pub fn acquire(&self) -> io::Result<File> {
        if let Some(handle) = self.handles.lock().pop() {
            return Ok(handle);
        }
        // open outside the lock so a slow open doesn't stall other readers
        trace!(path = %self.path.display(), "opening new pooled handle");
        File::open(&self.path)
    }

    pub fn release(&self, handle: File) {
        self.handles.lock().push(handle);
    }

    /// Number of idle handles currently held by the pool.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Closes every idle handle.
    pub fn clear(&self) {
        self.handles.lock().clear();
    }
}
