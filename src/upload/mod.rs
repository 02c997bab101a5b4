//! Encrypted chunk upload pipeline.
//!
//! A file is read from a forward-only stream one chunk at a time. Each chunk
//! is encrypted under the metadata key with a fresh nonce, split into
//! fragments, and its fragments uploaded; then a signed metadata blob
//! describing how to fetch the chunk is stored at the chunk's location.
//! Every blob except the last carries the next chunk's location encrypted
//! under the chunk key, so the file can be walked from its first location
//! with only the base key.
//!
//! Chunks are processed strictly in order: chunk `i + 1` is not read until
//! the metadata of chunk `i` has been stored.

pub mod fragment;
pub mod metadata;
pub mod network;

pub use fragment::{Fragment, Fragmenter, SplitFragmenter};
pub use metadata::{ChainLink, ChunkMetadata, FileProperties, Retriever, SignedMetadata};
pub use network::{ContentHash, NetworkAccess, NetworkError};

use std::io;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, ChunkLayout, LocatedChunk, Location};
use crate::crypto::aes::AesError;
use crate::crypto::ed25519::WriterKey;
use crate::crypto::key::{PublicKeyHash, SymmetricKey};
use crate::crypto::utils::generate_iv;
use metadata::MetadataError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("stream ended after {actual} of {expected} bytes")]
    ShortRead { expected: usize, actual: usize },
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("chunk encryption failed: {0}")]
    Crypto(#[from] AesError),
    #[error("metadata encoding failed: {0}")]
    Encoding(#[from] MetadataError),
    #[error("network returned {actual} hashes for {expected} fragments")]
    HashCountMismatch { expected: usize, actual: usize },
    #[error("upload cancelled after {completed} chunks")]
    Cancelled { completed: u64 },
    #[error("uploader is closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Receives upload progress.
pub trait ProgressSink: Send + Sync {
    /// Called once per chunk whose metadata has been stored.
    fn chunk_uploaded(&self, bytes: u64);

    /// Optional fragment-level progress reported by a network implementation.
    fn fragments_uploaded(&self, _count: usize) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync,
{
    fn chunk_uploaded(&self, bytes: u64) {
        self(bytes)
    }
}

/// Uploads one file as a chain of encrypted chunks.
pub struct FileUploader<R> {
    name: String,
    /// Start offset of the stream within the file. Informational.
    offset: u64,
    length: u64,
    reader: Option<R>,
    base_key: SymmetricKey,
    meta_key: SymmetricKey,
    parent: Option<(Location, SymmetricKey)>,
    properties: FileProperties,
    progress: Arc<dyn ProgressSink>,
    fragmenter: Arc<dyn Fragmenter>,
    layout: ChunkLayout,
    cancel: CancellationToken,
}

impl<R: AsyncRead + Unpin> FileUploader<R> {
    /// Create an uploader for `length` bytes of `reader`.
    ///
    /// A fresh base key is generated; override it with [`with_base_key`](Self::with_base_key).
    pub fn new(name: &str, mime_type: &str, reader: R, length: u64, meta_key: SymmetricKey) -> Self {
        Self {
            name: name.to_string(),
            offset: 0,
            length,
            reader: Some(reader),
            base_key: SymmetricKey::random(),
            meta_key,
            parent: None,
            properties: FileProperties::new(name, mime_type, length),
            progress: Arc::new(|_: u64| {}),
            fragmenter: Arc::new(SplitFragmenter::default()),
            layout: ChunkLayout::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_base_key(mut self, base_key: SymmetricKey) -> Self {
        self.base_key = base_key;
        self
    }

    /// Record a back-pointer to `location`, encrypted under `parent_key`.
    pub fn with_parent(mut self, location: Location, parent_key: SymmetricKey) -> Self {
        self.parent = Some((location, parent_key));
        self
    }

    pub fn with_properties(mut self, properties: FileProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_fragmenter(mut self, fragmenter: Arc<dyn Fragmenter>) -> Self {
        self.fragmenter = fragmenter;
        self
    }

    pub fn with_layout(mut self, layout: ChunkLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Token checked between chunks; cancelling it stops the upload.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn chunk_count(&self) -> u64 {
        self.layout.chunk_count(self.length)
    }

    pub fn base_key(&self) -> &SymmetricKey {
        &self.base_key
    }

    /// Upload every chunk, writing the first chunk's metadata at `start`.
    ///
    /// Returns `start`. Chunk locations are owned by `owner` and written by
    /// `writer`. Any failure aborts the upload; chunks already stored are
    /// left in place.
    pub async fn upload<N: NetworkAccess>(
        &mut self,
        network: &N,
        owner: PublicKeyHash,
        writer: &WriterKey,
        start: Location,
    ) -> Result<Location, UploadError> {
        if self.reader.is_none() {
            return Err(UploadError::Closed);
        }

        let started = Instant::now();
        let nchunks = self.chunk_count();
        log::debug!(
            "Uploading {} ({} bytes from offset {}) in {} chunks",
            self.name,
            self.length,
            self.offset,
            nchunks
        );

        let mut current = Location::new(owner, writer.public_hash(), start.map_key);
        for index in 0..nchunks {
            if self.cancel.is_cancelled() {
                log::info!("Upload of {} cancelled after {} chunks", self.name, index);
                return Err(UploadError::Cancelled { completed: index });
            }
            log::info!("uploading chunk {} of {}", index + 1, self.name);

            match self.upload_chunk(network, writer, index, nchunks, current).await? {
                Some(next) => current = next,
                None => break,
            }
        }

        log::info!(
            "Uploaded {} ({} bytes) in {} ms",
            self.name,
            self.length,
            started.elapsed().as_millis()
        );
        Ok(start)
    }

    /// Release the reader. Safe to call more than once.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("Closed uploader for {}", self.name);
        }
    }

    /// Upload chunk `index` at `location`; returns the next chunk's location.
    async fn upload_chunk<N: NetworkAccess>(
        &mut self,
        network: &N,
        writer: &WriterKey,
        index: u64,
        nchunks: u64,
        location: Location,
    ) -> Result<Option<Location>, UploadError> {
        let len = self.layout.chunk_len(index, self.length);
        let data = self.read_chunk(len).await?;

        let nonce = generate_iv();
        let located = LocatedChunk {
            location,
            existing_hash: None,
            chunk: Chunk::new(data, self.meta_key.clone(), location.map_key, nonce),
        };
        let next_location = (index + 1 < nchunks).then(|| location.with_random_map_key());

        let encrypted = located.chunk.encrypt()?;
        let fragments = self.fragmenter.split(&encrypted.ciphertext);
        log::debug!("Uploading chunk with {} fragments", fragments.len());

        let hashes = network
            .upload_fragments(
                &fragments,
                writer,
                self.progress.as_ref(),
                self.fragmenter.storage_increase_factor(),
            )
            .await?;
        if hashes.len() != fragments.len() {
            return Err(UploadError::HashCountMismatch {
                expected: fragments.len(),
                actual: hashes.len(),
            });
        }

        let next_chunk = match &next_location {
            Some(next) => Some(ChainLink::encrypt(next, &self.meta_key)?),
            None => None,
        };
        let retriever = Retriever {
            nonce,
            auth: encrypted.auth,
            fragment_hashes: hashes,
            next_chunk,
            fragmenter: self.fragmenter.id().to_string(),
        };
        let metadata = ChunkMetadata::create(
            located.existing_hash,
            &self.base_key,
            &self.meta_key,
            &self.properties,
            retriever,
            self.parent.as_ref().map(|(loc, key)| (loc, key)),
        )?;
        let signed = SignedMetadata::sign(&metadata, writer)?;

        network
            .upload_chunk(&signed, &located.location, writer)
            .await?;
        log::debug!("Stored chunk {} at {}", index, located.location);

        self.progress.chunk_uploaded(len as u64);
        Ok(next_location)
    }

    /// Read exactly `len` bytes, or fail with `ShortRead`.
    async fn read_chunk(&mut self, len: usize) -> Result<Vec<u8>, UploadError> {
        let reader = self.reader.as_mut().ok_or(UploadError::Closed)?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(UploadError::ShortRead {
                    expected: len,
                    actual: filled,
                });
            }
            filled += n;
        }
        Ok(buf)
    }
}
