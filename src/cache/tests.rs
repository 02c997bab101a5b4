//! Unit tests for the write-back cache.
//!
//! Uses an in-memory mock store that records every read and write.

#[cfg(test)]
mod write_back_cache_tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::cache::{CacheError, ChunkStore, StoreError, WriteBackCache};
    use crate::chunk::ChunkLayout;

    // ── Mock Store ───────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    struct WriteCall {
        parent: String,
        name: String,
        data: Vec<u8>,
        dirty_len: usize,
        offset: u64,
    }

    /// Files are full paths mapped to contents. A file is readable if it
    /// exists; writable if its parent is a known directory.
    struct MemoryStore {
        files: Mutex<HashMap<String, Vec<u8>>>,
        dirs: Mutex<Vec<String>>,
        reads: AtomicUsize,
        writes: Mutex<Vec<WriteCall>>,
        fail_writes: AtomicBool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
                dirs: Mutex::new(vec!["/".to_string()]),
                reads: AtomicUsize::new(0),
                writes: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn with_file(self, path: &str, content: &[u8]) -> Self {
            self.files.lock().insert(path.to_string(), content.to_vec());
            self
        }

        fn with_dir(self, dir: &str) -> Self {
            self.dirs.lock().push(dir.to_string());
            self
        }

        fn content(&self, path: &str) -> Vec<u8> {
            self.files.lock().get(path).cloned().unwrap_or_default()
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn writes(&self) -> Vec<WriteCall> {
            self.writes.lock().clone()
        }
    }

    impl ChunkStore for MemoryStore {
        fn read(
            &self,
            path: &str,
            size: usize,
            offset: u64,
        ) -> Result<Option<Vec<u8>>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let files = self.files.lock();
            Ok(files.get(path).map(|content| {
                let start = (offset as usize).min(content.len());
                let end = (start + size).min(content.len());
                content[start..end].to_vec()
            }))
        }

        fn write(
            &self,
            parent: &str,
            name: &str,
            data: &[u8],
            dirty_len: usize,
            offset: u64,
        ) -> Result<(), StoreError> {
            self.writes.lock().push(WriteCall {
                parent: parent.to_string(),
                name: name.to_string(),
                data: data.to_vec(),
                dirty_len,
                offset,
            });
            if self.fail_writes.load(Ordering::SeqCst) || !self.dirs.lock().iter().any(|d| d == parent) {
                return Err(StoreError::NotFound(parent.to_string()));
            }

            let path = if parent == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", parent, name)
            };
            let mut files = self.files.lock();
            let content = files.entry(path).or_default();
            let end = offset as usize + dirty_len;
            if content.len() < end {
                content.resize(end, 0);
            }
            content[offset as usize..end].copy_from_slice(&data[..dirty_len]);
            Ok(())
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    const CHUNK: u64 = 1024;

    fn cache(store: &Arc<MemoryStore>, capacity: usize) -> WriteBackCache<MemoryStore> {
        WriteBackCache::new(store.clone(), ChunkLayout::new(CHUNK).unwrap(), capacity)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[test]
    fn test_write_then_read_before_flush() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b""));
        let cache = cache(&store, 1);
        let data = pattern(100, 7);

        assert_eq!(cache.write("/a.txt", &data, 0).unwrap(), 100);
        assert_eq!(cache.read("/a.txt", 100, 0).unwrap(), data);

        // Only the initial hydrate touched the store, nothing was persisted.
        assert_eq!(store.reads(), 1);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_straddling_requests_rejected() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b""));
        let cache = cache(&store, 1);

        let err = cache.write("/a.txt", &[1u8; 10], 1020).unwrap_err();
        assert!(matches!(err, CacheError::InvalidRange { offset: 1020, size: 10 }));
        assert_eq!(err.errno(), libc::EINVAL);

        let err = cache.read("/a.txt", 2, 1023).unwrap_err();
        assert!(matches!(err, CacheError::InvalidRange { .. }));

        // Rejected before touching the store or creating an entry.
        assert_eq!(store.reads(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_request_ending_on_boundary_accepted() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b""));
        let cache = cache(&store, 1);
        assert_eq!(cache.write("/a.txt", &[5u8; 24], 1000).unwrap(), 24);
        assert_eq!(cache.read("/a.txt", 24, 1000).unwrap(), vec![5u8; 24]);
    }

    #[test]
    fn test_read_hydrates_and_zero_pads() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b"hello"));
        let cache = cache(&store, 1);

        assert_eq!(cache.read("/a.txt", 5, 0).unwrap(), b"hello");
        assert_eq!(cache.read("/a.txt", 4, 3).unwrap(), b"lo\0\0");
        assert_eq!(store.reads(), 1);
    }

    #[test]
    fn test_missing_path_creates_no_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store, 1);

        let err = cache.read("/nope", 10, 0).unwrap_err();
        assert!(matches!(err, CacheError::MissingPath(ref p) if p == "/nope"));
        assert_eq!(err.errno(), libc::ENOENT);
        assert!(!cache.contains("/nope"));

        assert!(matches!(
            cache.write("/nope", b"x", 0),
            Err(CacheError::MissingPath(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flush_persists_dirty_prefix_from_base() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", &[0u8; 3000]));
        let cache = cache(&store, 1);

        cache.write("/a.txt", b"abc", 2048 + 10).unwrap();
        cache.write("/a.txt", b"z", 2048 + 2).unwrap();
        cache.flush("/a.txt").unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].parent, "/");
        assert_eq!(writes[0].name, "a.txt");
        assert_eq!(writes[0].offset, 2048);
        assert_eq!(writes[0].dirty_len, 13);
        assert_eq!(writes[0].data.len(), 13);
        assert_eq!(&writes[0].data[10..], b"abc");
        assert_eq!(writes[0].data[2], b'z');

        assert!(!cache.contains("/a.txt"));
        assert_eq!(&store.content("/a.txt")[2058..2061], b"abc");
    }

    #[test]
    fn test_flush_clean_entry_writes_nothing() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b"data"));
        let cache = cache(&store, 1);

        cache.read("/a.txt", 4, 0).unwrap();
        assert!(cache.contains("/a.txt"));
        cache.flush("/a.txt").unwrap();

        assert!(store.writes().is_empty());
        assert!(!cache.contains("/a.txt"));
    }

    #[test]
    fn test_flush_absent_path_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store, 1);
        cache.flush("/never-opened").unwrap();
        cache.close("/never-opened").unwrap();
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_chunk_switch_flushes_stale_entry() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b""));
        let cache = cache(&store, 1);

        cache.write("/a.txt", b"first", 0).unwrap();
        cache.write("/a.txt", b"second", CHUNK + 4).unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].offset, 0);
        assert_eq!(writes[0].data, b"first");
        assert_eq!(cache.len(), 1);

        // The new chunk sees the persisted length; the old chunk re-hydrates from the store.
        assert_eq!(cache.read("/a.txt", 6, CHUNK + 4).unwrap(), b"second");
        assert_eq!(cache.read("/a.txt", 5, 0).unwrap(), b"first");
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn test_capacity_one_evicts_first_path() {
        let store = Arc::new(
            MemoryStore::new()
                .with_file("/a.txt", b"")
                .with_file("/b.txt", b""),
        );
        let cache = cache(&store, 1);

        cache.write("/a.txt", &pattern(50, 1), 0).unwrap();
        cache.read("/b.txt", 10, 0).unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 1, "eviction flushes exactly once");
        assert_eq!(writes[0].name, "a.txt");
        assert_eq!(writes[0].dirty_len, 50);
        assert_eq!(writes[0].offset, 0);
        assert!(!cache.contains("/a.txt"));
        assert!(cache.contains("/b.txt"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_order_respects_access() {
        let store = Arc::new(
            MemoryStore::new()
                .with_file("/a", b"")
                .with_file("/b", b"")
                .with_file("/c", b""),
        );
        let cache = cache(&store, 2);

        cache.write("/a", b"A", 0).unwrap();
        cache.write("/b", b"B", 0).unwrap();
        // Touch "/a" so "/b" becomes least recently used.
        cache.read("/a", 1, 0).unwrap();
        cache.read("/c", 1, 0).unwrap();

        assert!(cache.contains("/a"));
        assert!(!cache.contains("/b"));
        assert!(cache.contains("/c"));
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].name, "b");
    }

    #[test]
    fn test_flush_failure_keeps_entry_dirty() {
        let store = Arc::new(MemoryStore::new().with_file("/missing/a.txt", b""));
        let cache = cache(&store, 1);

        cache.write("/missing/a.txt", b"keep me", 0).unwrap();
        let err = cache.flush("/missing/a.txt").unwrap_err();
        assert!(matches!(err, CacheError::FlushFailed { .. }));
        assert_eq!(err.errno(), libc::ENOENT);

        // Still cached and still readable.
        assert!(cache.contains("/missing/a.txt"));
        assert_eq!(cache.read("/missing/a.txt", 7, 0).unwrap(), b"keep me");
        assert_eq!(cache.annotate_size("/missing/a.txt", 0), 7);

        // A retry attempts the write again.
        assert!(cache.flush("/missing/a.txt").is_err());
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn test_flush_retry_succeeds_once_parent_exists() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", b""));
        store.fail_writes.store(true, Ordering::SeqCst);
        let cache = cache(&store, 1);

        cache.write("/a.txt", b"retry", 0).unwrap();
        assert!(cache.flush("/a.txt").is_err());

        store.fail_writes.store(false, Ordering::SeqCst);
        cache.flush("/a.txt").unwrap();
        assert_eq!(store.content("/a.txt"), b"retry");
        assert!(!cache.contains("/a.txt"));
    }

    #[test]
    fn test_failed_eviction_blocks_admission() {
        let store = Arc::new(
            MemoryStore::new()
                .with_file("/gone/a.txt", b"")
                .with_file("/b.txt", b""),
        );
        let cache = cache(&store, 1);

        cache.write("/gone/a.txt", b"dirty", 0).unwrap();
        let err = cache.read("/b.txt", 1, 0).unwrap_err();
        assert!(matches!(err, CacheError::FlushFailed { ref path, .. } if path == "/gone/a.txt"));

        assert!(cache.contains("/gone/a.txt"));
        assert!(!cache.contains("/b.txt"));
    }

    #[test]
    fn test_annotate_size() {
        let store = Arc::new(MemoryStore::new().with_file("/a.txt", &[1u8; 100]).with_dir("/d"));
        let cache = cache(&store, 1);

        assert_eq!(cache.annotate_size("/a.txt", 100), 100);
        cache.write("/a.txt", b"tail", CHUNK + 60).unwrap();
        assert_eq!(cache.annotate_size("/a.txt", 100), CHUNK + 64);
        // Never shrinks below what is persisted.
        assert_eq!(cache.annotate_size("/a.txt", 5000), 5000);

        cache.flush("/a.txt").unwrap();
        assert_eq!(cache.annotate_size("/a.txt", 100), 100);
    }

    #[test]
    fn test_flush_all() {
        let store = Arc::new(
            MemoryStore::new()
                .with_dir("/d")
                .with_file("/d/a", b"")
                .with_file("/d/b", b""),
        );
        let cache = cache(&store, 4);

        cache.write("/d/a", b"one", 0).unwrap();
        cache.write("/d/b", b"two", 0).unwrap();
        cache.flush_all().unwrap();

        assert!(cache.is_empty());
        assert_eq!(store.content("/d/a"), b"one");
        assert_eq!(store.content("/d/b"), b"two");
        assert_eq!(store.writes().len(), 2);
    }

    #[test]
    fn test_zero_capacity_treated_as_one() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache(&store, 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_paths() {
        let store = Arc::new(
            MemoryStore::new()
                .with_file("/p0", b"")
                .with_file("/p1", b"")
                .with_file("/p2", b"")
                .with_file("/p3", b""),
        );
        let cache = Arc::new(cache(&store, 4));

        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let path = format!("/p{}", i);
                    for j in 0..16u64 {
                        cache.write(&path, &[i; 8], j * 8).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..4u8 {
            let path = format!("/p{}", i);
            assert_eq!(cache.read(&path, 128, 0).unwrap(), vec![i; 128]);
        }
        assert!(store.writes().is_empty());
        cache.flush_all().unwrap();
        for i in 0..4u8 {
            assert_eq!(store.content(&format!("/p{}", i)), vec![i; 128]);
        }
    }
}
