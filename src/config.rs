//! Runtime configuration.
//!
//! Values come from the environment, optionally seeded from a `.env` file.
//! Unset variables fall back to the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::chunk::{ChunkLayout, MAX_CHUNK_SIZE};
use crate::sync::FLUSH_INTERVAL;

pub const ENV_CHUNK_SIZE: &str = "CHUNKVAULT_CHUNK_SIZE";
pub const ENV_CACHE_CAPACITY: &str = "CHUNKVAULT_CACHE_CAPACITY";
pub const ENV_FLUSH_INTERVAL_SECS: &str = "CHUNKVAULT_FLUSH_INTERVAL_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plaintext bytes per chunk.
    pub chunk_size: u64,
    /// Paths with a cached chunk before LRU eviction.
    pub cache_capacity: usize,
    /// Periodic flush interval.
    #[serde(with = "duration_secs")]
    pub flush_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE as u64,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

impl Config {
    /// Load from the process environment after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let chunk_size = parse_var(&lookup, ENV_CHUNK_SIZE)?.unwrap_or(defaults.chunk_size);
        if chunk_size == 0 {
            return Err(ConfigError::Zero(ENV_CHUNK_SIZE));
        }

        let cache_capacity = parse_var::<usize>(&lookup, ENV_CACHE_CAPACITY)?
            .unwrap_or(defaults.cache_capacity);
        if cache_capacity == 0 {
            return Err(ConfigError::Zero(ENV_CACHE_CAPACITY));
        }

        let flush_interval = parse_var::<u64>(&lookup, ENV_FLUSH_INTERVAL_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.flush_interval);

        Ok(Self {
            chunk_size,
            cache_capacity,
            flush_interval,
        })
    }

    pub fn layout(&self) -> Result<ChunkLayout, ConfigError> {
        ChunkLayout::new(self.chunk_size).map_err(|_| ConfigError::Zero(ENV_CHUNK_SIZE))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(value) => {
            let trimmed = value.trim();
            trimmed
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber { var, value })
        }
        None => Ok(None),
    }
}

/// Initialize `env_logger` once. Later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
