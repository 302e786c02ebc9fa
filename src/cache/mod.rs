//! Key-value store holding the synced payload.
//!
//! The store is an external get/set/delete service; values are opaque strings
//! with a per-write expiry.

use std::time::Duration;

use async_trait::async_trait;

mod memory;
mod rest;

pub use memory::MemoryCacheStore;
pub use rest::RestKvStore;

/// Bumped whenever the serialized payload shape changes, so a deploy never
/// reads an entry written by an older build.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a live entry existed. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Versioned cache key, e.g. `booking_data:v2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn payload(namespace: &str) -> Self {
        Self(format!("{}:v{}", namespace, PAYLOAD_SCHEMA_VERSION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
