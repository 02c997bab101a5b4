//! Chunk metadata blobs and the encrypted chain between chunks.
//!
//! Key hierarchy for one chunk:
//!
//! ```text
//! base key ──wraps──> chunk key ──encrypts──> chunk body
//!                         │                   next-chunk link
//!                         └──wraps──> properties key ──encrypts──> file properties
//! parent key ──encrypts──> parent location
//! ```
//!
//! A reader holding only the base key can therefore unwrap the chunk key
//! and follow each chunk's link to the next one. The blob itself is CBOR
//! encoded and signed by the writer.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::network::ContentHash;
use crate::chunk::Location;
use crate::crypto::aes::{self, AesError, AES_IV_SIZE, AES_TAG_SIZE};
use crate::crypto::ed25519::{self, WriterKey, ED25519_PUBLIC_KEY_SIZE};
use crate::crypto::key::SymmetricKey;
use crate::crypto::utils::generate_iv;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Encryption failed")]
    Crypto(#[from] AesError),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CBOR encoding failed: {0}")]
    Encode(String),
    #[error("CBOR decoding failed: {0}")]
    Decode(String),
    #[error("Invalid wrapped key")]
    InvalidKey,
}

/// User-visible properties of the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Modification timestamp (Unix ms).
    pub modified_at: u64,
    pub is_hidden: bool,
}

impl FileProperties {
    /// Properties for a file modified now. Dot-files are hidden.
    pub fn new(name: &str, mime_type: &str, size: u64) -> Self {
        let modified_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size,
            modified_at,
            is_hidden: name.starts_with('.'),
        }
    }
}

/// Next chunk's location, encrypted under the current chunk's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub nonce: [u8; AES_IV_SIZE],
    pub ciphertext: Vec<u8>,
}

impl ChainLink {
    /// Encrypt `next` under `chunk_key` with a fresh nonce.
    pub fn encrypt(next: &Location, chunk_key: &SymmetricKey) -> Result<Self, MetadataError> {
        let plaintext = serde_json::to_vec(next)?;
        let nonce = generate_iv();
        let ciphertext = aes::encrypt_aes_gcm(&plaintext, chunk_key.as_bytes(), &nonce)?;
        Ok(Self { nonce, ciphertext })
    }

    pub fn decrypt(&self, chunk_key: &SymmetricKey) -> Result<Location, MetadataError> {
        let plaintext = aes::decrypt_aes_gcm(&self.ciphertext, chunk_key.as_bytes(), &self.nonce)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Everything needed to fetch and decrypt one chunk body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retriever {
    pub nonce: [u8; AES_IV_SIZE],
    pub auth: [u8; AES_TAG_SIZE],
    pub fragment_hashes: Vec<ContentHash>,
    /// Absent on the last chunk of a file.
    pub next_chunk: Option<ChainLink>,
    pub fragmenter: String,
}

/// Metadata blob stored at a chunk's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Hash of the blob this one supersedes, for optimistic concurrency.
    pub existing_hash: Option<ContentHash>,
    /// Chunk key sealed under the base key.
    wrapped_chunk_key: Vec<u8>,
    /// Random per-blob properties key sealed under the chunk key.
    wrapped_properties_key: Vec<u8>,
    /// File properties (JSON) sealed under the properties key.
    properties: Vec<u8>,
    pub retriever: Retriever,
    /// Parent location (JSON) sealed under the parent key.
    parent: Option<Vec<u8>>,
}

impl ChunkMetadata {
    pub fn create(
        existing_hash: Option<ContentHash>,
        base_key: &SymmetricKey,
        chunk_key: &SymmetricKey,
        props: &FileProperties,
        retriever: Retriever,
        parent: Option<(&Location, &SymmetricKey)>,
    ) -> Result<Self, MetadataError> {
        let properties_key = SymmetricKey::random();
        let props_json = serde_json::to_vec(props)?;

        let parent = match parent {
            Some((location, key)) => {
                let json = serde_json::to_vec(location)?;
                Some(aes::seal_aes_gcm(&json, key.as_bytes())?)
            }
            None => None,
        };

        Ok(Self {
            existing_hash,
            wrapped_chunk_key: aes::seal_aes_gcm(chunk_key.as_bytes(), base_key.as_bytes())?,
            wrapped_properties_key: aes::seal_aes_gcm(
                properties_key.as_bytes(),
                chunk_key.as_bytes(),
            )?,
            properties: aes::seal_aes_gcm(&props_json, properties_key.as_bytes())?,
            retriever,
            parent,
        })
    }

    /// Unwrap the chunk key with the file's base key.
    pub fn chunk_key(&self, base_key: &SymmetricKey) -> Result<SymmetricKey, MetadataError> {
        unwrap_key(&self.wrapped_chunk_key, base_key)
    }

    /// Location of the next chunk, or `None` for the last chunk.
    pub fn next_location(&self, base_key: &SymmetricKey) -> Result<Option<Location>, MetadataError> {
        match &self.retriever.next_chunk {
            Some(link) => {
                let chunk_key = self.chunk_key(base_key)?;
                Ok(Some(link.decrypt(&chunk_key)?))
            }
            None => Ok(None),
        }
    }

    pub fn properties(&self, base_key: &SymmetricKey) -> Result<FileProperties, MetadataError> {
        let chunk_key = self.chunk_key(base_key)?;
        let properties_key = unwrap_key(&self.wrapped_properties_key, &chunk_key)?;
        let json = aes::unseal_aes_gcm(&self.properties, properties_key.as_bytes())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Back-pointer to the parent directory, if one was recorded.
    pub fn parent_location(
        &self,
        parent_key: &SymmetricKey,
    ) -> Result<Option<Location>, MetadataError> {
        match &self.parent {
            Some(sealed) => {
                let json = aes::unseal_aes_gcm(sealed, parent_key.as_bytes())?;
                Ok(Some(serde_json::from_slice(&json)?))
            }
            None => Ok(None),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| MetadataError::Encode(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        ciborium::from_reader(bytes).map_err(|e| MetadataError::Decode(e.to_string()))
    }
}

fn unwrap_key(sealed: &[u8], key: &SymmetricKey) -> Result<SymmetricKey, MetadataError> {
    let mut raw = aes::unseal_aes_gcm(sealed, key.as_bytes())?;
    let unwrapped = SymmetricKey::try_from_slice(&raw);
    crate::crypto::utils::clear_bytes(&mut raw);
    unwrapped.ok_or(MetadataError::InvalidKey)
}

/// CBOR-encoded metadata plus the writer's signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMetadata {
    pub bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub public_key: [u8; ED25519_PUBLIC_KEY_SIZE],
}

impl SignedMetadata {
    pub fn sign(metadata: &ChunkMetadata, writer: &WriterKey) -> Result<Self, MetadataError> {
        let bytes = metadata.encode()?;
        let signature = writer.sign(&bytes).to_vec();
        Ok(Self {
            bytes,
            signature,
            public_key: writer.public_key(),
        })
    }

    pub fn verify(&self) -> bool {
        ed25519::verify_ed25519(&self.bytes, &self.signature, &self.public_key)
    }

    pub fn metadata(&self) -> Result<ChunkMetadata, MetadataError> {
        ChunkMetadata::decode(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MapKey;
    use crate::crypto::key::PublicKeyHash;

    fn location(seed: u8) -> Location {
        Location::new(
            PublicKeyHash::of(b"owner"),
            PublicKeyHash::of(b"writer"),
            MapKey::from_bytes([seed; 32]),
        )
    }

    fn retriever(next: Option<ChainLink>) -> Retriever {
        Retriever {
            nonce: [1u8; AES_IV_SIZE],
            auth: [2u8; AES_TAG_SIZE],
            fragment_hashes: vec![ContentHash::sha256(b"frag").unwrap()],
            next_chunk: next,
            fragmenter: "split".to_string(),
        }
    }

    #[test]
    fn test_chain_link_decrypts_with_chunk_key_only() {
        let chunk_key = SymmetricKey::random();
        let link = ChainLink::encrypt(&location(9), &chunk_key).unwrap();
        assert_eq!(link.decrypt(&chunk_key).unwrap(), location(9));
        assert!(link.decrypt(&SymmetricKey::random()).is_err());
    }

    #[test]
    fn test_base_key_reveals_next_location() {
        let base_key = SymmetricKey::random();
        let chunk_key = SymmetricKey::random();
        let link = ChainLink::encrypt(&location(5), &chunk_key).unwrap();
        let props = FileProperties::new("report.pdf", "application/pdf", 10);

        let meta =
            ChunkMetadata::create(None, &base_key, &chunk_key, &props, retriever(Some(link)), None)
                .unwrap();

        assert_eq!(meta.chunk_key(&base_key).unwrap(), chunk_key);
        assert_eq!(meta.next_location(&base_key).unwrap(), Some(location(5)));
        assert_eq!(meta.properties(&base_key).unwrap(), props);
        assert!(meta.next_location(&SymmetricKey::random()).is_err());
        assert_eq!(meta.parent_location(&SymmetricKey::random()).unwrap(), None);
    }

    #[test]
    fn test_last_chunk_has_no_next_location() {
        let base_key = SymmetricKey::random();
        let props = FileProperties::new(".hidden", "text/plain", 0);
        assert!(props.is_hidden);

        let meta = ChunkMetadata::create(
            None,
            &base_key,
            &SymmetricKey::random(),
            &props,
            retriever(None),
            None,
        )
        .unwrap();
        assert_eq!(meta.next_location(&base_key).unwrap(), None);
    }

    #[test]
    fn test_parent_back_pointer() {
        let parent_key = SymmetricKey::random();
        let meta = ChunkMetadata::create(
            None,
            &SymmetricKey::random(),
            &SymmetricKey::random(),
            &FileProperties::new("a", "", 1),
            retriever(None),
            Some((&location(3), &parent_key)),
        )
        .unwrap();
        assert_eq!(meta.parent_location(&parent_key).unwrap(), Some(location(3)));
        assert!(meta.parent_location(&SymmetricKey::random()).is_err());
    }

    #[test]
    fn test_signed_blob_decodes_and_verifies() {
        let writer = WriterKey::generate();
        let hash = ContentHash::sha256(b"old").unwrap();
        let meta = ChunkMetadata::create(
            Some(hash.clone()),
            &SymmetricKey::random(),
            &SymmetricKey::random(),
            &FileProperties::new("a", "", 1),
            retriever(None),
            None,
        )
        .unwrap();

        let signed = SignedMetadata::sign(&meta, &writer).unwrap();
        assert!(signed.verify());
        let decoded = signed.metadata().unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.existing_hash, Some(hash));

        let mut tampered = signed.clone();
        tampered.bytes[0] ^= 0x01;
        assert!(!tampered.verify());
    }
}
