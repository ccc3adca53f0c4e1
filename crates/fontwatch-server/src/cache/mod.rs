//! Content-addressed bundle cache.
//!
//! Bundles are stored under the hex sha256 of their bytes. Identical
//! content always maps to the same key, so an existing entry is never
//! overwritten. Each put counts as one reference; a purge releases one and
//! the bundle goes away with the last.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::CacheKey;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use memory::{CacheConfig, MemoryCache};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Client of the bundle cache.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Stores `bundle` and returns its content key.
    async fn put(&self, bundle: Vec<u8>) -> Result<CacheKey, CacheError>;

    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Releases one reference to `key`, or all of them when `force`.
    /// Returns the references left; unknown keys report 0.
    async fn purge(&self, key: &CacheKey, force: bool) -> Result<u64, CacheError>;
}

/// Content key of `bytes`: lowercase hex sha256.
pub fn content_key(bytes: &[u8]) -> CacheKey {
    CacheKey::new(hex::encode(Sha256::digest(bytes)))
}
