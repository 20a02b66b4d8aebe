//! Cache key model
//!
//! A cache key captures everything that affects an artifact's correctness:
//! target identity, source pin, build options, toolchain fingerprint. Key
//! equality is the sole criterion for cache validity; there are no partial
//! matches. Every key has a deterministic content checksum used as a storage
//! address component.

mod options;
mod pin;

pub use options::{BuildConfiguration, BuildOptions, Linkage, Platform};
pub use pin::PinState;

use crate::error::StrataResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::Hash;

/// SHA-256 hex digest of a value's canonical JSON serialization.
///
/// Canonical means key-sorted: the value is converted through
/// `serde_json::Value`, whose object map is a `BTreeMap`, so field order in
/// the source struct never leaks into the digest. Stable across process runs
/// and machines.
pub fn canonical_checksum<T: Serialize>(value: &T) -> StrataResult<String> {
    let canonical = serde_json::to_value(value)?;
    let serialized = serde_json::to_string(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Identity of one cache entry, at either granularity
///
/// Implemented by [`ArtifactKey`] (per buildable unit) and [`ResolutionKey`]
/// (whole dependency graph). Equality is field-wise; `checksum` is the
/// storage address component.
pub trait StorageKey: Clone + Eq + Hash + Serialize + Send + Sync {
    /// Human-readable address component (directory-name safe)
    fn label(&self) -> String;

    /// Deterministic content checksum of the canonical serialization
    fn checksum(&self) -> StrataResult<String> {
        canonical_checksum(self)
    }
}

/// Cache key for one buildable unit's binary artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Name of the buildable unit
    pub unit_name: String,
    /// Exactly which source snapshot the unit comes from
    pub source: PinState,
    /// Resolved build options
    pub options: BuildOptions,
    /// Compiler/toolchain version string
    pub toolchain_fingerprint: String,
    /// Host system version, when it affects the produced binary
    pub system_version: Option<String>,
}

impl StorageKey for ArtifactKey {
    fn label(&self) -> String {
        self.unit_name.clone()
    }
}

/// Cache key for a memoized dependency-resolution result
///
/// Much coarser than [`ArtifactKey`]: one hash of the manifest/lock-file
/// identity stands in for the whole resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionKey {
    pub origin_hash: String,
}

impl ResolutionKey {
    pub fn new(origin_hash: impl Into<String>) -> Self {
        Self {
            origin_hash: origin_hash.into(),
        }
    }

    /// Derive the key from raw manifest/lock-file contents
    pub fn from_manifest_contents(contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        Self {
            origin_hash: hex::encode(hasher.finalize()),
        }
    }
}

impl StorageKey for ResolutionKey {
    fn label(&self) -> String {
        "resolution".to_string()
    }
}
