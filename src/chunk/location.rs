//! Locations of chunk metadata blobs in content-addressed storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::key::PublicKeyHash;
use crate::crypto::utils::{generate_map_key, MAP_KEY_SIZE};

/// Random identifier that, with owner and writer, names a chunk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapKey([u8; MAP_KEY_SIZE]);

impl MapKey {
    pub fn random() -> Self {
        Self(generate_map_key())
    }

    pub fn from_bytes(bytes: [u8; MAP_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAP_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapKey({})", hex::encode(&self.0[..8]))
    }
}

/// (owner, writer, map-key) triple addressing a chunk's metadata blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub owner: PublicKeyHash,
    pub writer: PublicKeyHash,
    pub map_key: MapKey,
}

impl Location {
    pub fn new(owner: PublicKeyHash, writer: PublicKeyHash, map_key: MapKey) -> Self {
        Self {
            owner,
            writer,
            map_key,
        }
    }

    /// Location with the same owner and writer under a fresh random map-key.
    pub fn with_random_map_key(&self) -> Self {
        Self {
            map_key: MapKey::random(),
            ..*self
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.owner,
            self.writer,
            hex::encode(&self.map_key.as_bytes()[..8])
        )
    }
}
