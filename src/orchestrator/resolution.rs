//! Resolution cache
//!
//! Memoizes dependency-resolution results at whole-graph granularity: one
//! origin hash (manifest/lock-file identity) stands in for the entire target
//! set, and the cached entry is a serialized snapshot of the resolved graph.
//! Restoration and backfill follow the exact same ordered consumer walk as
//! the artifact cache, with a single logical entry.

use crate::error::StrataResult;
use crate::key::ResolutionKey;
use crate::orchestrator::tiered::{RestoreRequest, StoreRequest, TieredCache};
use crate::orchestrator::DEFAULT_RESOLUTION_PARALLELISM;
use crate::policy::CachePolicy;
use crate::storage::StorageAddress;
use std::path::Path;
use tracing::debug;

/// Tiered cache over resolved-dependency-graph snapshots
pub struct ResolutionCache {
    tiered: TieredCache,
}

impl ResolutionCache {
    pub fn new(policies: Vec<CachePolicy>) -> Self {
        Self {
            tiered: TieredCache::new(policies, DEFAULT_RESOLUTION_PARALLELISM),
        }
    }

    /// Restore the snapshot for an origin hash into `destination`.
    ///
    /// Walks consumer policies in priority order; on a hit, backfills every
    /// earlier producer-capable storage that missed, then returns the name
    /// of the storage that served the hit. `None` is a clean whole-chain
    /// miss (or a chain with no consumers): the caller re-resolves.
    pub async fn restore(
        &self,
        key: &ResolutionKey,
        destination: &Path,
    ) -> StrataResult<Option<String>> {
        let address = StorageAddress::from_key(key)?;
        let outcome = self
            .tiered
            .restore(vec![RestoreRequest {
                id: (),
                address,
                destination: destination.to_path_buf(),
            }])
            .await;

        let Some(entry) = outcome.restored.first() else {
            debug!("resolution cache miss for {}", key.origin_hash);
            return Ok(None);
        };

        let storage = entry.storage_name.clone();
        debug!(
            "resolution cache hit for {} from '{}'",
            key.origin_hash, storage
        );
        self.tiered.backfill(&outcome.restored).await;
        Ok(Some(storage))
    }

    /// Store a freshly-resolved snapshot under its origin hash.
    ///
    /// Returns the producer storages that accepted it; failures are soft.
    pub async fn store(
        &self,
        snapshot_dir: &Path,
        key: &ResolutionKey,
    ) -> StrataResult<Vec<String>> {
        let address = StorageAddress::from_key(key)?;
        let outcomes = self
            .tiered
            .store(vec![StoreRequest {
                id: (),
                address,
                artifact: snapshot_dir.to_path_buf(),
            }])
            .await;

        Ok(outcomes.into_iter().next().map(|o| o.produced_to).unwrap_or_default())
    }
}
