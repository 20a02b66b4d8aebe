//! Directory-tree cache storage
//!
//! Entries live as plain directory trees at `{root}/{label}/{checksum}/`.
//! Used both for the project-local cache (a directory inside the workspace)
//! and the system-local cache (under the user cache dir). Fetch and store
//! both go through a staging directory and commit with a rename, so a
//! partial transfer never looks like a complete entry.

use crate::error::{StrataError, StrataResult};
use crate::mover::ArtifactMover;
use crate::storage::{CacheStorage, StorageAddress};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Cache storage backed by a local directory tree
pub struct LocalDirectoryStorage {
    name: String,
    root: PathBuf,
    mover: ArtifactMover,
    preferred_parallelism: Option<usize>,
}

impl LocalDirectoryStorage {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            mover: ArtifactMover::new(),
            preferred_parallelism: None,
        }
    }

    /// Override the fan-out width the orchestrator uses with this backend
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.preferred_parallelism = Some(parallelism);
        self
    }

    /// Directory holding the entry for an address
    fn entry_dir(&self, address: &StorageAddress) -> PathBuf {
        self.root.join(&address.label).join(&address.checksum)
    }

    /// Uuid-named staging directory inside the backend root, so the final
    /// rename never crosses filesystems.
    fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging").join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl CacheStorage for LocalDirectoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_parallelism(&self) -> Option<usize> {
        self.preferred_parallelism
    }

    async fn exists_valid_cache(&self, address: &StorageAddress) -> StrataResult<bool> {
        Ok(self.entry_dir(address).is_dir())
    }

    async fn fetch_artifacts(
        &self,
        address: &StorageAddress,
        destination: &Path,
    ) -> StrataResult<()> {
        let entry = self.entry_dir(address);
        if !entry.is_dir() {
            return Err(StrataError::storage(
                &self.name,
                format!("no entry for {}", address),
            ));
        }

        debug!("{}: fetching {} to {}", self.name, address, destination.display());

        let staging = self.staging_dir();
        self.mover.copy_dir(&entry, &staging).await?;
        self.mover.replace_dir(&staging, destination).await
    }

    async fn cache_artifact(&self, artifact: &Path, address: &StorageAddress) -> StrataResult<()> {
        if !artifact.is_dir() {
            return Err(StrataError::PathNotFound(artifact.to_path_buf()));
        }

        debug!("{}: storing {} from {}", self.name, address, artifact.display());

        let staging = self.staging_dir();
        self.mover.copy_dir(artifact, &staging).await?;
        self.mover.replace_dir(&staging, &self.entry_dir(address)).await
    }
}
