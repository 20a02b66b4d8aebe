//! Remote object-store cache storage
//!
//! Entries are tar+zstd archives in an HTTP object store, addressed by
//! checksum with a two-character prefix segment:
//! `{base}/{checksum[..2]}/{checksum}.tar.zst`. Addressing by checksum alone
//! de-duplicates identical configurations across unrelated targets; the
//! prefix keeps any one listing small. HTTP calls are blocking (`ureq`) and
//! run on the blocking pool.

use crate::error::{StrataError, StrataResult};
use crate::mover::ArtifactMover;
use crate::storage::{CacheStorage, StorageAddress};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Cache storage backed by an HTTP object store
pub struct HttpObjectStorage {
    name: String,
    base_url: String,
    mover: ArtifactMover,
    preferred_parallelism: Option<usize>,
}

impl HttpObjectStorage {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            name: name.into(),
            base_url,
            mover: ArtifactMover::new(),
            preferred_parallelism: None,
        }
    }

    /// Override the fan-out width the orchestrator uses with this backend
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.preferred_parallelism = Some(parallelism);
        self
    }

    /// Object URL for an address
    fn object_url(&self, address: &StorageAddress) -> String {
        let prefix = &address.checksum[..2.min(address.checksum.len())];
        format!("{}/{}/{}.tar.zst", self.base_url, prefix, address.checksum)
    }

    fn staging_dir() -> PathBuf {
        std::env::temp_dir()
            .join("strata-remote")
            .join(Uuid::new_v4().to_string())
    }

    fn transport_error(&self, err: ureq::Error) -> StrataError {
        StrataError::storage(&self.name, err.to_string())
    }
}

/// Archive a directory tree into a tar+zstd byte buffer
fn pack_dir(dir: &Path) -> std::io::Result<Vec<u8>> {
    let encoder = zstd::stream::write::Encoder::new(Vec::new(), 0)?;
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()
}

/// Unpack a tar+zstd byte buffer into a directory
fn unpack_into(bytes: &[u8], destination: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(destination)?;
    let decoder = zstd::stream::read::Decoder::new(bytes)?;
    tar::Archive::new(decoder).unpack(destination)
}

#[async_trait]
impl CacheStorage for HttpObjectStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_parallelism(&self) -> Option<usize> {
        self.preferred_parallelism
    }

    async fn exists_valid_cache(&self, address: &StorageAddress) -> StrataResult<bool> {
        let url = self.object_url(address);
        debug!("{}: HEAD {}", self.name, url);

        let result = tokio::task::spawn_blocking(move || ureq::head(&url).call())
            .await
            .map_err(|e| StrataError::Internal(format!("blocking task panicked: {e}")))?;

        match result {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    async fn fetch_artifacts(
        &self,
        address: &StorageAddress,
        destination: &Path,
    ) -> StrataResult<()> {
        let url = self.object_url(address);
        let staging = Self::staging_dir();
        debug!("{}: GET {}", self.name, url);

        let entry = address.to_string();
        let name = self.name.clone();
        let staging_for_task = staging.clone();
        let result: Result<(), StrataError> = tokio::task::spawn_blocking(move || {
            let mut response = ureq::get(&url)
                .call()
                .map_err(|e| StrataError::storage(&name, e.to_string()))?;
            let bytes = response
                .body_mut()
                .read_to_vec()
                .map_err(|e| StrataError::storage(&name, e.to_string()))?;
            unpack_into(&bytes, &staging_for_task).map_err(|_| StrataError::FetchIncomplete {
                storage: name.clone(),
                entry,
            })
        })
        .await
        .map_err(|e| StrataError::Internal(format!("blocking task panicked: {e}")))?;

        if let Err(e) = result {
            let _ = self.mover.delete(&staging).await;
            return Err(e);
        }

        self.mover.replace_dir(&staging, destination).await
    }

    async fn cache_artifact(&self, artifact: &Path, address: &StorageAddress) -> StrataResult<()> {
        if !artifact.is_dir() {
            return Err(StrataError::PathNotFound(artifact.to_path_buf()));
        }

        let url = self.object_url(address);
        debug!("{}: PUT {}", self.name, url);

        let name = self.name.clone();
        let artifact = artifact.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let body = pack_dir(&artifact)
                .map_err(|e| StrataError::io("packing artifact archive", e))?;
            ureq::put(&url)
                .send(&body[..])
                .map_err(|e| StrataError::storage(&name, e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StrataError::Internal(format!("blocking task panicked: {e}")))?
    }
}
