//! Chunk data model and chunk-boundary arithmetic.
//!
//! A file is stored as a chain of chunks of at most `MAX_CHUNK_SIZE`
//! plaintext bytes. Each chunk is encrypted independently under its own key
//! with a fresh nonce and lives at a `Location` named by a random map-key.

pub mod addressing;
pub mod location;

pub use addressing::{AddressingError, ChunkLayout};
pub use location::{Location, MapKey};

use crate::crypto::aes::{self, AesError, AES_IV_SIZE, AES_TAG_SIZE};
use crate::crypto::key::SymmetricKey;
use crate::upload::network::ContentHash;

/// Default maximum plaintext size of one chunk (5 MiB).
pub const MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Plaintext chunk ready for encryption.
pub struct Chunk {
    data: Vec<u8>,
    key: SymmetricKey,
    map_key: MapKey,
    nonce: [u8; AES_IV_SIZE],
}

impl Chunk {
    pub fn new(data: Vec<u8>, key: SymmetricKey, map_key: MapKey, nonce: [u8; AES_IV_SIZE]) -> Self {
        Self {
            data,
            key,
            map_key,
            nonce,
        }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn map_key(&self) -> MapKey {
        self.map_key
    }

    pub fn nonce(&self) -> &[u8; AES_IV_SIZE] {
        &self.nonce
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encrypt the chunk body, consuming the plaintext.
    pub fn encrypt(self) -> Result<EncryptedChunk, AesError> {
        let mut data = self.data;
        let auth = aes::encrypt_detached(&mut data, self.key.as_bytes(), &self.nonce)?;
        Ok(EncryptedChunk {
            ciphertext: data,
            auth,
        })
    }
}

/// Ciphertext of a chunk plus its detached authentication tag.
pub struct EncryptedChunk {
    pub ciphertext: Vec<u8>,
    pub auth: [u8; AES_TAG_SIZE],
}

impl EncryptedChunk {
    /// Decrypt back to plaintext.
    pub fn decrypt(
        mut self,
        key: &SymmetricKey,
        nonce: &[u8; AES_IV_SIZE],
    ) -> Result<Vec<u8>, AesError> {
        aes::decrypt_detached(&mut self.ciphertext, key.as_bytes(), nonce, &self.auth)?;
        Ok(self.ciphertext)
    }
}

/// A chunk bound to the location it will be written at.
pub struct LocatedChunk {
    pub location: Location,
    /// Hash of the blob this write supersedes; `None` for a fresh location.
    pub existing_hash: Option<ContentHash>,
    pub chunk: Chunk,
}
