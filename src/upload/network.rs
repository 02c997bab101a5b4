//! Network capability used by the upload pipeline.
//!
//! The crate ships no transport. The embedding application implements
//! [`NetworkAccess`] over its content-addressed backend.

use std::fmt;

use multihash::Multihash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::fragment::Fragment;
use super::metadata::SignedMetadata;
use super::ProgressSink;
use crate::chunk::Location;
use crate::crypto::ed25519::WriterKey;

/// Multicodec code for SHA2-256.
const SHA2_256: u64 = 0x12;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NetworkError(pub String);

/// Multihash bytes identifying a stored blob.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    /// SHA2-256 multihash of `data`.
    pub fn sha256(data: &[u8]) -> Result<Self, multihash::Error> {
        let digest = Sha256::digest(data);
        let mh = Multihash::<64>::wrap(SHA2_256, &digest)?;
        Ok(Self(mh.to_bytes()))
    }

    /// Wrap raw multihash bytes returned by a backend.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", hex::encode(&self.0))
    }
}

/// Content-addressed storage client.
///
/// Implementations must be safe to call concurrently; the pipeline itself
/// issues one call at a time per upload.
#[allow(async_fn_in_trait)]
pub trait NetworkAccess {
    /// Store each fragment, returning one content hash per fragment in order.
    async fn upload_fragments(
        &self,
        fragments: &[Fragment],
        writer: &WriterKey,
        progress: &dyn ProgressSink,
        expansion_factor: u32,
    ) -> Result<Vec<ContentHash>, NetworkError>;

    /// Store a signed metadata blob at `location`.
    async fn upload_chunk(
        &self,
        metadata: &SignedMetadata,
        location: &Location,
        writer: &WriterKey,
    ) -> Result<ContentHash, NetworkError>;
}
