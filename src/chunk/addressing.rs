//! Offset and chunk-index arithmetic.
//!
//! Every cache request must fall inside a single chunk. This layer only
//! validates; it never splits a straddling request, callers pre-split.

use thiserror::Error;

use super::MAX_CHUNK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressingError {
    #[error("range at offset {offset} with size {size} straddles a chunk boundary")]
    InvalidRange { offset: u64, size: u64 },
    #[error("chunk size must be non-zero")]
    InvalidChunkSize,
}

/// Fixed chunk geometry shared by the cache and the upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    chunk_size: u64,
}

impl ChunkLayout {
    pub fn new(chunk_size: u64) -> Result<Self, AddressingError> {
        if chunk_size == 0 {
            return Err(AddressingError::InvalidChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Start offset of the chunk containing `pos`.
    pub fn align_to_chunk_size(&self, pos: u64) -> u64 {
        (pos / self.chunk_size) * self.chunk_size
    }

    /// Position of `pos` within its chunk.
    pub fn intra_chunk_offset(&self, pos: u64) -> usize {
        (pos % self.chunk_size) as usize
    }

    /// Whether `[start, end)` lies in a single chunk.
    ///
    /// An empty range counts as lying in `start`'s chunk.
    pub fn contained_in_one_chunk(&self, start: u64, end: u64) -> bool {
        if end <= start {
            return true;
        }
        self.align_to_chunk_size(start) == self.align_to_chunk_size(end - 1)
    }

    /// Reject a request of `size` bytes at `offset` that straddles a boundary.
    pub fn check_range(&self, offset: u64, size: u64) -> Result<(), AddressingError> {
        let end = offset
            .checked_add(size)
            .ok_or(AddressingError::InvalidRange { offset, size })?;
        if self.contained_in_one_chunk(offset, end) {
            Ok(())
        } else {
            Err(AddressingError::InvalidRange { offset, size })
        }
    }

    /// Number of chunks a file of `length` bytes occupies.
    ///
    /// An empty file still has one (empty) chunk.
    pub fn chunk_count(&self, length: u64) -> u64 {
        if length == 0 {
            1
        } else {
            length.div_ceil(self.chunk_size)
        }
    }

    /// Byte length of chunk `index` in a file of `length` bytes.
    pub fn chunk_len(&self, index: u64, length: u64) -> usize {
        let position = index.saturating_mul(self.chunk_size);
        length.saturating_sub(position).min(self.chunk_size) as usize
    }
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE as u64,
        }
    }
}
