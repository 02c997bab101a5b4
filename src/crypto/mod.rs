//! Cryptographic primitives used by the chunk pipeline.
//!
//! Symmetric encryption is AES-256-GCM throughout: chunk bodies, chain links,
//! wrapped keys and encrypted properties. Metadata blobs are signed with the
//! writer's Ed25519 key.

pub mod aes;
pub mod ed25519;
pub mod key;
pub mod utils;

pub use aes::{decrypt_aes_gcm, encrypt_aes_gcm, seal_aes_gcm, unseal_aes_gcm, AesError};
pub use ed25519::{verify_ed25519, Ed25519Error, WriterKey};
pub use key::{PublicKeyHash, SymmetricKey};
pub use utils::{clear_bytes, generate_iv, generate_map_key, generate_random_bytes};
