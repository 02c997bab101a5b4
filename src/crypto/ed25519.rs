//! Ed25519 writer keys.
//!
//! Every metadata blob is signed by the writer that owns the chunk's
//! location. The writer is addressed by the SHA-256 hash of its public key.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

use super::key::PublicKeyHash;

/// Ed25519 public key size in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 private key size in bytes.
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum Ed25519Error {
    #[error("Invalid private key size")]
    InvalidPrivateKeySize,
}

/// A writer's signing key together with the hash of its public key.
pub struct WriterKey {
    signing_key: SigningKey,
    public_hash: PublicKeyHash,
}

impl WriterKey {
    /// Generate a new random writer key.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Load a writer from a 32-byte Ed25519 private key.
    pub fn from_private_key(private_key: &[u8]) -> Result<Self, Ed25519Error> {
        let mut key_bytes: [u8; ED25519_PRIVATE_KEY_SIZE] = private_key
            .try_into()
            .map_err(|_| Ed25519Error::InvalidPrivateKeySize)?;
        let signing_key = SigningKey::from_bytes(&key_bytes);
        key_bytes.zeroize();
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_hash = PublicKeyHash::of(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            public_hash,
        }
    }

    pub fn public_key(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_hash(&self) -> PublicKeyHash {
        self.public_hash
    }

    /// Sign a message. Returns a 64-byte deterministic signature.
    pub fn sign(&self, message: &[u8]) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for WriterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterKey")
            .field("public_hash", &self.public_hash)
            .finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature.
///
/// Returns true if valid, false otherwise. Never panics.
pub fn verify_ed25519(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    if signature.len() != ED25519_SIGNATURE_SIZE || public_key.len() != ED25519_PUBLIC_KEY_SIZE {
        return false;
    }

    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };

    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };

    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &sig).is_ok()
}
