//! Cache storage backends
//!
//! A storage is a stateless capability with three operations: existence
//! check, fetch, write. Backends differ in where entries live and how
//! addresses map to paths, but identical keys must yield identical logical
//! results on every backend — the orchestrator depends on that for
//! correctness. Backends own their timeouts and surface them as ordinary
//! failures, which the orchestrator degrades to misses.

mod local;
mod passthrough;
mod remote;

pub use local::LocalDirectoryStorage;
pub use passthrough::PassthroughStorage;
pub use remote::HttpObjectStorage;

use crate::error::StrataResult;
use crate::key::StorageKey;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Backend-agnostic address of one cache entry
///
/// Derived once from a [`StorageKey`]; keeps the storage trait object-safe
/// and independent of the key granularity. Two keys collide only if their
/// checksums collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageAddress {
    /// Human-readable component (unit name, or "resolution")
    pub label: String,
    /// Content checksum of the canonical key serialization
    pub checksum: String,
}

impl StorageAddress {
    pub fn from_key<K: StorageKey>(key: &K) -> StrataResult<Self> {
        Ok(Self {
            label: key.label(),
            checksum: key.checksum()?,
        })
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.label, &self.checksum[..12.min(self.checksum.len())])
    }
}

/// Abstract cache storage interface
///
/// Implementations must be safe for concurrent use from many workers;
/// callers never serialize access on their behalf. Writes are idempotent:
/// storing the same address twice is safe.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Concurrency level this backend prefers for fan-out, if any
    fn preferred_parallelism(&self) -> Option<usize> {
        None
    }

    /// Whether a complete entry exists for the address
    ///
    /// `Ok(false)` is a clean miss; `Err` is a genuine I/O failure. The
    /// orchestrator treats both as misses but only logs the latter.
    async fn exists_valid_cache(&self, address: &StorageAddress) -> StrataResult<bool>;

    /// Materialize the entry at `destination`
    ///
    /// Must fail loudly rather than leave a partial artifact behind.
    async fn fetch_artifacts(&self, address: &StorageAddress, destination: &Path)
        -> StrataResult<()>;

    /// Store the artifact at `artifact` under the address
    ///
    /// Best-effort from the orchestrator's point of view, but a partial
    /// write must fail the call rather than truncate silently.
    async fn cache_artifact(&self, artifact: &Path, address: &StorageAddress) -> StrataResult<()>;
}
