//! Secure random generation helpers.

use rand::RngCore;
use zeroize::Zeroize;

use super::aes::{AES_IV_SIZE, AES_KEY_SIZE};

/// Size of a random map-key in bytes.
pub const MAP_KEY_SIZE: usize = 32;

/// Generate cryptographically secure random bytes.
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a random 32-byte AES key.
pub fn generate_key_bytes() -> [u8; AES_KEY_SIZE] {
    let mut key = [0u8; AES_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random 12-byte IV.
pub fn generate_iv() -> [u8; AES_IV_SIZE] {
    let mut iv = [0u8; AES_IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Generate a random map-key.
pub fn generate_map_key() -> [u8; MAP_KEY_SIZE] {
    let mut key = [0u8; MAP_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Zeroize sensitive data in a byte slice.
pub fn clear_bytes(buf: &mut [u8]) {
    buf.zeroize();
}
