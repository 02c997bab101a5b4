//! Write-back chunk cache keyed by path.
//!
//! Holds at most one chunk buffer per path and at most `capacity` paths.
//! Reads and writes are served from memory; bytes reach the backing store
//! only when an entry is flushed, which happens on:
//! - a chunk switch for the same path,
//! - an explicit `flush`/`close`,
//! - LRU eviction when a new path is admitted beyond capacity.
//!
//! Every request must lie inside a single chunk. Straddling requests are a
//! caller defect and fail with `CacheError::InvalidRange`.
//!
//! Locking: the directory lock is held only for lookup, admission and
//! eviction; each path's slot has its own lock serializing its reads,
//! writes and flushes. A slot lock is never held while taking the
//! directory lock.

pub mod entry;
pub mod store;
#[cfg(test)]
mod tests;

pub use entry::CacheEntry;
pub use store::{ChunkStore, StoreError};

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

use crate::chunk::{AddressingError, ChunkLayout};

/// Default number of paths with a cached chunk.
pub const DEFAULT_CACHE_CAPACITY: usize = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("request at offset {offset} with size {size} straddles a chunk boundary")]
    InvalidRange { offset: u64, size: u64 },
    #[error("missing path: {0}")]
    MissingPath(String),
    #[error("flush of {path} failed: {source}")]
    FlushFailed {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("store error for {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },
}

impl CacheError {
    /// Standard I/O error code for the filesystem layer.
    pub fn errno(&self) -> i32 {
        match self {
            CacheError::InvalidRange { .. } => libc::EINVAL,
            CacheError::MissingPath(_) => libc::ENOENT,
            CacheError::FlushFailed { source, .. } | CacheError::Store { source, .. } => {
                source.errno()
            }
        }
    }
}

impl From<AddressingError> for CacheError {
    fn from(e: AddressingError) -> Self {
        match e {
            AddressingError::InvalidRange { offset, size } => {
                CacheError::InvalidRange { offset, size }
            }
            AddressingError::InvalidChunkSize => CacheError::InvalidRange { offset: 0, size: 0 },
        }
    }
}

/// State of one path's slot in the directory.
enum Slot {
    /// Admitted but not yet hydrated.
    Vacant,
    Loaded(CacheEntry),
    /// Flushed and removed from the directory; holders must look up again.
    Detached,
}

type SlotRef = Arc<Mutex<Slot>>;

pub struct WriteBackCache<S: ChunkStore> {
    store: Arc<S>,
    layout: ChunkLayout,
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<String, SlotRef>>,
}

impl<S: ChunkStore> WriteBackCache<S> {
    /// Create a cache over `store` holding at most `capacity` paths.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(store: Arc<S>, layout: ChunkLayout, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            layout,
            capacity,
            // Capacity is enforced by `admit` so that eviction can flush first.
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    pub fn with_default_capacity(store: Arc<S>, layout: ChunkLayout) -> Self {
        Self::new(store, layout, DEFAULT_CACHE_CAPACITY)
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of paths currently holding a slot.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains(path)
    }

    /// Read `size` bytes of `path` at `offset` through the cache.
    pub fn read(&self, path: &str, size: usize, offset: u64) -> Result<Vec<u8>, CacheError> {
        self.layout.check_range(offset, size as u64)?;
        if size == 0 {
            return Ok(Vec::new());
        }
        let intra = self.layout.intra_chunk_offset(offset);
        self.with_entry(path, offset, |entry| entry.read_at(intra, size))?
            .map_err(CacheError::from)
    }

    /// Write `bytes` into `path` at `offset`. Returns the number of bytes written.
    ///
    /// The write lands in memory only; it is persisted by a later flush.
    pub fn write(&self, path: &str, bytes: &[u8], offset: u64) -> Result<usize, CacheError> {
        self.layout.check_range(offset, bytes.len() as u64)?;
        if bytes.is_empty() {
            return Ok(0);
        }
        let intra = self.layout.intra_chunk_offset(offset);
        self.with_entry(path, offset, |entry| entry.write_at(intra, bytes))?
            .map_err(CacheError::from)
    }

    /// Persist the dirty region of `path` (if any) and drop its entry.
    ///
    /// On failure the entry stays cached and dirty so a later flush can retry.
    pub fn flush(&self, path: &str) -> Result<(), CacheError> {
        let slot = match self.entries.lock().peek(path) {
            Some(slot) => slot.clone(),
            None => return Ok(()),
        };

        {
            let mut state = slot.lock();
            if let Slot::Loaded(entry) = &mut *state {
                self.persist(path, entry)?;
            }
            *state = Slot::Detached;
        }
        self.forget(path, &slot);
        Ok(())
    }

    /// Release a path after the file is closed. Same as [`flush`](Self::flush).
    pub fn close(&self, path: &str) -> Result<(), CacheError> {
        self.flush(path)
    }

    /// Flush every cached path.
    ///
    /// All paths are attempted; the first failure is returned.
    pub fn flush_all(&self) -> Result<(), CacheError> {
        let paths: Vec<String> = self
            .entries
            .lock()
            .iter()
            .map(|(path, _)| path.clone())
            .collect();

        let mut first_err = None;
        for path in paths {
            if let Err(e) = self.flush(&path) {
                log::warn!("Flush of {} failed: {}", path, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// File size to report for `path`, given the size persisted in the store.
    ///
    /// A dirty cached chunk may extend the file past what the store knows.
    pub fn annotate_size(&self, path: &str, persisted_size: u64) -> u64 {
        let slot = match self.entries.lock().peek(path) {
            Some(slot) => slot.clone(),
            None => return persisted_size,
        };
        let state = slot.lock();
        match &*state {
            Slot::Loaded(entry) if entry.is_dirty() => persisted_size.max(entry.dirty_end()),
            _ => persisted_size,
        }
    }

    /// Run `op` against the entry covering `offset`, loading it if needed.
    fn with_entry<T>(
        &self,
        path: &str,
        offset: u64,
        op: impl FnOnce(&mut CacheEntry) -> T,
    ) -> Result<T, CacheError> {
        let base = self.layout.align_to_chunk_size(offset);
        loop {
            let slot = self.admit(path)?;
            let mut state = slot.lock();

            match &mut *state {
                Slot::Detached => {
                    drop(state);
                    self.forget(path, &slot);
                    continue;
                }
                Slot::Loaded(entry) if entry.base() == base => return Ok(op(entry)),
                Slot::Loaded(entry) => {
                    log::debug!(
                        "Chunk switch on {}: {} -> {}",
                        path,
                        entry.base(),
                        base
                    );
                    self.persist(path, entry)?;
                }
                Slot::Vacant => {}
            }

            return match self.hydrate(path, base) {
                Ok(mut entry) => {
                    let out = op(&mut entry);
                    *state = Slot::Loaded(entry);
                    Ok(out)
                }
                Err(e) => {
                    *state = Slot::Detached;
                    drop(state);
                    self.forget(path, &slot);
                    Err(e)
                }
            };
        }
    }

    /// Look up the slot for `path`, admitting a vacant one if absent.
    ///
    /// Admission beyond capacity evicts least-recently-used paths, flushing
    /// each first. A failed eviction flush aborts admission and leaves the
    /// victim cached.
    fn admit(&self, path: &str) -> Result<SlotRef, CacheError> {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get(path) {
            return Ok(slot.clone());
        }

        while entries.len() >= self.capacity.get() {
            let Some((victim_path, victim)) = entries
                .peek_lru()
                .map(|(p, s)| (p.clone(), s.clone()))
            else {
                break;
            };

            {
                let mut state = victim.lock();
                if let Slot::Loaded(entry) = &mut *state {
                    log::debug!("Evicting {} (chunk {})", victim_path, entry.base());
                    self.persist(&victim_path, entry)?;
                }
                *state = Slot::Detached;
            }
            entries.pop(&victim_path);
        }

        let slot: SlotRef = Arc::new(Mutex::new(Slot::Vacant));
        entries.put(path.to_string(), slot.clone());
        Ok(slot)
    }

    /// Remove `path` from the directory if it still maps to `slot`.
    fn forget(&self, path: &str, slot: &SlotRef) {
        let mut entries = self.entries.lock();
        if entries.peek(path).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            entries.pop(path);
        }
    }

    fn hydrate(&self, path: &str, base: u64) -> Result<CacheEntry, CacheError> {
        let chunk_size = self.layout.chunk_size() as usize;
        match self.store.read(path, chunk_size, base) {
            Ok(Some(bytes)) => Ok(CacheEntry::hydrate(base, chunk_size, bytes)),
            Ok(None) | Err(StoreError::NotFound(_)) => {
                Err(CacheError::MissingPath(path.to_string()))
            }
            Err(source) => Err(CacheError::Store {
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Write the dirty region of `entry` to the store and mark it clean.
    fn persist(&self, path: &str, entry: &mut CacheEntry) -> Result<(), CacheError> {
        if !entry.is_dirty() {
            return Ok(());
        }

        let (parent, name) = split_path(path).ok_or_else(|| CacheError::FlushFailed {
            path: path.to_string(),
            source: StoreError::NotFound(path.to_string()),
        })?;

        let dirty = entry.dirty_bytes();
        log::debug!(
            "Flushing {} bytes of {} at offset {}",
            dirty.len(),
            path,
            entry.base()
        );
        match self
            .store
            .write(parent, name, dirty, dirty.len(), entry.base())
        {
            Ok(()) => {
                entry.mark_clean();
                Ok(())
            }
            Err(source) => {
                log::warn!("Flush of {} failed, keeping dirty chunk: {}", path, source);
                Err(CacheError::FlushFailed {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }
}

/// Split a path into its parent directory and file name.
fn split_path(path: &str) -> Option<(&str, &str)> {
    let p = Path::new(path);
    let name = p.file_name()?.to_str()?;
    let parent = p.parent()?.to_str()?;
    Some((parent, name))
}
