//! Write-back chunk cache and encrypted chunk-chain upload pipeline.
//!
//! - [`cache::WriteBackCache`] serves path-keyed reads and writes from one
//!   chunk buffer per path and persists dirty bytes on chunk switch, close,
//!   or LRU eviction.
//! - [`upload::FileUploader`] streams a file into a chain of encrypted,
//!   fragmented chunks on a content-addressed backend.
//! - [`sync::PeriodicFlusher`] optionally flushes the cache on a timer.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod crypto;
pub mod error;
pub mod sync;
pub mod upload;

pub use cache::{CacheError, ChunkStore, StoreError, WriteBackCache};
pub use chunk::{ChunkLayout, Location, MapKey, MAX_CHUNK_SIZE};
pub use config::{init_logging, Config};
pub use error::{Error, Result};
pub use upload::{FileUploader, NetworkAccess, ProgressSink, UploadError};
