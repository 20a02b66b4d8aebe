//! Pass-through cache storage
//!
//! Models a policy where the output directory itself is the cache: every
//! existence check misses, every write is a no-op. With this as the only
//! policy, the orchestrator degenerates to validate-then-build.

use crate::error::{StrataError, StrataResult};
use crate::storage::{CacheStorage, StorageAddress};
use async_trait::async_trait;
use std::path::Path;

/// Storage with no backing store at all
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStorage;

impl PassthroughStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStorage for PassthroughStorage {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn exists_valid_cache(&self, _address: &StorageAddress) -> StrataResult<bool> {
        Ok(false)
    }

    // Never reached: this storage never reports a hit.
    async fn fetch_artifacts(
        &self,
        _address: &StorageAddress,
        _destination: &Path,
    ) -> StrataResult<()> {
        Err(StrataError::StorageNotReadable("passthrough".to_string()))
    }

    async fn cache_artifact(&self, _artifact: &Path, _address: &StorageAddress) -> StrataResult<()> {
        Ok(())
    }
}
