//! Crate-level error type.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::crypto::{AesError, Ed25519Error};
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Aes(#[from] AesError),
    #[error(transparent)]
    Ed25519(#[from] Ed25519Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// I/O error code for filesystem-facing callers.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Cache(e) => e.errno(),
            Error::Config(_) => libc::EINVAL,
            Error::Upload(UploadError::Cancelled { .. }) => libc::ECANCELED,
            _ => libc::EIO,
        }
    }
}
