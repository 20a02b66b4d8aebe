//! Metadata sidecar persistence
//!
//! One small JSON record per cached unit, co-located with the unit's output
//! directory, holding the cache key that produced (or last validated) the
//! artifact there. The next orchestration pass reads it to validate the
//! on-disk artifact without any storage round-trips. Written pretty-printed
//! so a key mismatch is diffable by hand.

use crate::error::{StrataError, StrataResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Sidecar file name, stored next to (not inside) the output directory
const SIDECAR_SUFFIX: &str = ".artifact-key.json";

/// Current sidecar format version
const SIDECAR_VERSION: u32 = 1;

/// On-disk envelope around a persisted cache key
///
/// Validation compares only `key`; the rest is provenance for humans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarEnvelope<K> {
    pub version: u32,
    pub key: K,
    pub written_at: DateTime<Utc>,
}

/// Path of the sidecar for a given output directory
pub fn sidecar_path(output_dir: &Path) -> PathBuf {
    let name = output_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.with_file_name(format!("{}{}", name, SIDECAR_SUFFIX))
}

/// Read the recorded key for an output directory
///
/// `None` means no usable sidecar: absent, unreadable as the current format,
/// or from a different format version. All of those force revalidation
/// through the normal restore/build path, so none is an error.
pub async fn read_key<K: DeserializeOwned>(output_dir: &Path) -> Option<K> {
    let path = sidecar_path(output_dir);
    let contents = fs::read_to_string(&path).await.ok()?;
    let envelope: SidecarEnvelope<K> = serde_json::from_str(&contents).ok()?;
    if envelope.version != SIDECAR_VERSION {
        return None;
    }
    Some(envelope.key)
}

/// Persist the key for an output directory, overwriting any previous record
pub async fn write_key<K: Serialize>(output_dir: &Path, key: &K) -> StrataResult<()> {
    let envelope = SidecarEnvelope {
        version: SIDECAR_VERSION,
        key,
        written_at: Utc::now(),
    };
    let contents = serde_json::to_string_pretty(&envelope)?;

    let path = sidecar_path(output_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StrataError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::write(&path, contents)
        .await
        .map_err(|e| StrataError::io(format!("writing sidecar {}", path.display()), e))
}

/// Remove the sidecar for an output directory, if present
pub async fn remove(output_dir: &Path) -> StrataResult<()> {
    let path = sidecar_path(output_dir);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StrataError::io(
            format!("removing sidecar {}", path.display()),
            e,
        )),
    }
}
