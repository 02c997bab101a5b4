//! A single cached chunk buffer.
//!
//! The buffer is always exactly one chunk long and zero-padded past the end
//! of the file. `max_dirty_pos` is the high-water mark of unpersisted bytes
//! relative to the chunk base; zero means clean.

use zeroize::Zeroize;

use crate::chunk::AddressingError;

pub struct CacheEntry {
    base: u64,
    data: Vec<u8>,
    max_dirty_pos: usize,
}

impl CacheEntry {
    /// Build an entry for the chunk starting at `base` from whatever the
    /// store returned. Short reads are zero-padded, overlong reads truncated.
    pub fn hydrate(base: u64, chunk_size: usize, mut read: Vec<u8>) -> Self {
        read.resize(chunk_size, 0);
        Self {
            base,
            data: read,
            max_dirty_pos: 0,
        }
    }

    /// Chunk-aligned file offset of this buffer.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn max_dirty_pos(&self) -> usize {
        self.max_dirty_pos
    }

    pub fn is_dirty(&self) -> bool {
        self.max_dirty_pos > 0
    }

    /// File length implied by the dirty region.
    pub fn dirty_end(&self) -> u64 {
        self.base + self.max_dirty_pos as u64
    }

    fn ensure_in_bounds(&self, offset: usize, len: usize) -> Result<(), AddressingError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(AddressingError::InvalidRange {
                offset: self.base + offset as u64,
                size: len as u64,
            }),
        }
    }

    /// Copy `len` bytes starting at intra-chunk `offset`.
    pub fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>, AddressingError> {
        self.ensure_in_bounds(offset, len)?;
        Ok(self.data[offset..offset + len].to_vec())
    }

    /// Copy `bytes` into the buffer at intra-chunk `offset` and extend the dirty region.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<usize, AddressingError> {
        self.ensure_in_bounds(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        if !bytes.is_empty() {
            self.max_dirty_pos = self.max_dirty_pos.max(offset + bytes.len());
        }
        Ok(bytes.len())
    }

    /// The prefix of the buffer that must be persisted.
    pub fn dirty_bytes(&self) -> &[u8] {
        &self.data[..self.max_dirty_pos]
    }

    pub fn mark_clean(&mut self) {
        self.max_dirty_pos = 0;
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}
