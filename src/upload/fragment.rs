//! Fragmentation of chunk ciphertext.
//!
//! Erasure coding is pluggable through [`Fragmenter`]. The crate only ships
//! [`SplitFragmenter`], which cuts the ciphertext into fixed-size pieces
//! without redundancy.

use thiserror::Error;

/// Default maximum size of a single fragment (128 KiB).
pub const DEFAULT_FRAGMENT_SIZE: usize = 128 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("fragments hold {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Independently stored piece of a chunk's ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub data: Vec<u8>,
}

pub trait Fragmenter: Send + Sync {
    /// Identifier recorded in each chunk's retriever.
    fn id(&self) -> &str;

    /// Split ciphertext into an ordered fragment sequence.
    fn split(&self, ciphertext: &[u8]) -> Vec<Fragment>;

    /// Rebuild ciphertext of `len` bytes from fragments in upload order.
    fn recombine(&self, fragments: &[Fragment], len: usize) -> Result<Vec<u8>, FragmentError>;

    /// Bytes stored per byte of ciphertext.
    fn storage_increase_factor(&self) -> u32;
}

/// Plain splitting into pieces of at most `fragment_size` bytes.
#[derive(Debug, Clone)]
pub struct SplitFragmenter {
    fragment_size: usize,
}

impl SplitFragmenter {
    /// A fragment size of zero is treated as the default.
    pub fn new(fragment_size: usize) -> Self {
        Self {
            fragment_size: if fragment_size == 0 {
                DEFAULT_FRAGMENT_SIZE
            } else {
                fragment_size
            },
        }
    }
}

impl Default for SplitFragmenter {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_SIZE)
    }
}

impl Fragmenter for SplitFragmenter {
    fn id(&self) -> &str {
        "split"
    }

    fn split(&self, ciphertext: &[u8]) -> Vec<Fragment> {
        ciphertext
            .chunks(self.fragment_size)
            .map(|piece| Fragment {
                data: piece.to_vec(),
            })
            .collect()
    }

    fn recombine(&self, fragments: &[Fragment], len: usize) -> Result<Vec<u8>, FragmentError> {
        let out: Vec<u8> = fragments
            .iter()
            .flat_map(|f| f.data.iter().copied())
            .collect();
        if out.len() != len {
            return Err(FragmentError::LengthMismatch {
                expected: len,
                actual: out.len(),
            });
        }
        Ok(out)
    }

    fn storage_increase_factor(&self) -> u32 {
        1
    }
}
