//! AES-256-GCM encryption/decryption.
//!
//! Sealed format: IV (12 bytes) || Ciphertext || Auth Tag (16 bytes).
//! Chunk bodies use the detached form instead, since the auth tag and the
//! nonce travel in the chunk's retriever rather than next to the fragments.

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use thiserror::Error;

use super::utils::generate_iv;

/// AES-256-GCM key size in bytes (256 bits).
pub const AES_KEY_SIZE: usize = 32;

/// AES-GCM IV size in bytes (96 bits).
pub const AES_IV_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes (128 bits).
pub const AES_TAG_SIZE: usize = 16;

/// Minimum sealed data size: IV + auth tag (empty plaintext).
const MIN_SEALED_SIZE: usize = AES_IV_SIZE + AES_TAG_SIZE;

#[derive(Debug, Error)]
pub enum AesError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key size")]
    InvalidKeySize,
    #[error("Invalid IV size")]
    InvalidIvSize,
}

/// Encrypt data using AES-256-GCM.
///
/// Returns ciphertext with 16-byte auth tag appended.
pub fn encrypt_aes_gcm(
    plaintext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>, AesError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AesError::InvalidKeySize)?;
    let nonce = Nonce::from_slice(iv);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| AesError::EncryptionFailed)
}

/// Decrypt data using AES-256-GCM.
///
/// Expects ciphertext with 16-byte auth tag appended.
pub fn decrypt_aes_gcm(
    ciphertext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>, AesError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AesError::InvalidKeySize)?;
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| AesError::DecryptionFailed)
}

/// Encrypt data in place, returning the auth tag separately.
///
/// `buffer` holds the plaintext on entry and the ciphertext (same length) on return.
pub fn encrypt_detached(
    buffer: &mut [u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
) -> Result<[u8; AES_TAG_SIZE], AesError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AesError::InvalidKeySize)?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", buffer)
        .map_err(|_| AesError::EncryptionFailed)?;

    let mut out = [0u8; AES_TAG_SIZE];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// Decrypt a ciphertext produced by [`encrypt_detached`] in place.
pub fn decrypt_detached(
    buffer: &mut [u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_IV_SIZE],
    tag: &[u8; AES_TAG_SIZE],
) -> Result<(), AesError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AesError::InvalidKeySize)?;
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), b"", buffer, Tag::from_slice(tag))
        .map_err(|_| AesError::DecryptionFailed)
}

/// Seal data using AES-256-GCM with automatic IV generation.
///
/// Returns: IV (12 bytes) || Ciphertext || Auth Tag (16 bytes)
pub fn seal_aes_gcm(plaintext: &[u8], key: &[u8; AES_KEY_SIZE]) -> Result<Vec<u8>, AesError> {
    let iv = generate_iv();
    let ciphertext = encrypt_aes_gcm(plaintext, key, &iv)?;

    let mut sealed = Vec::with_capacity(AES_IV_SIZE + ciphertext.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Unseal data encrypted with `seal_aes_gcm`.
///
/// Extracts IV from first 12 bytes, decrypts remainder.
pub fn unseal_aes_gcm(sealed: &[u8], key: &[u8; AES_KEY_SIZE]) -> Result<Vec<u8>, AesError> {
    if sealed.len() < MIN_SEALED_SIZE {
        return Err(AesError::DecryptionFailed);
    }

    let iv: [u8; AES_IV_SIZE] = sealed[..AES_IV_SIZE]
        .try_into()
        .map_err(|_| AesError::InvalidIvSize)?;
    let ciphertext = &sealed[AES_IV_SIZE..];

    decrypt_aes_gcm(ciphertext, key, &iv)
}
