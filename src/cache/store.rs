//! Backing-store capability used to hydrate and persist cached chunks.
//!
//! The filesystem-facing layer implements this over its own tree. The cache
//! never resolves paths itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store rejected request: {0}")]
    Backend(String),
}

impl StoreError {
    /// Standard I/O error code for the filesystem layer.
    pub fn errno(&self) -> i32 {
        match self {
            StoreError::NotFound(_) => libc::ENOENT,
            StoreError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            StoreError::Backend(_) => libc::EIO,
        }
    }
}

/// Read/write capabilities of the backing store.
///
/// Implementations must be thread-safe; the cache calls them from whichever
/// request thread triggered a hydrate or flush.
pub trait ChunkStore: Send + Sync {
    /// Read up to `size` bytes of `path` starting at `offset`.
    ///
    /// Returns `Ok(None)` when the path cannot be resolved. A short (or
    /// empty) result means the file ends inside the requested range.
    fn read(&self, path: &str, size: usize, offset: u64) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write the first `dirty_len` bytes of `data` to `parent/name` at `offset`.
    ///
    /// Fails with `StoreError::NotFound` when the parent does not exist.
    fn write(
        &self,
        parent: &str,
        name: &str,
        data: &[u8],
        dirty_len: usize,
        offset: u64,
    ) -> Result<(), StoreError>;
}
