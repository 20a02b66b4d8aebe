//! Local artifact movement primitives
//!
//! Copy, replace, and delete for artifact directories and sidecars. These
//! are plain local I/O: unlike storage backends they are treated as
//! reliable, so failures propagate instead of degrading to cache misses.

use crate::error::{StrataError, StrataResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Local copy/move/delete for artifacts and sidecars
#[derive(Debug, Clone, Default)]
pub struct ArtifactMover;

impl ArtifactMover {
    pub fn new() -> Self {
        Self
    }

    /// Recursively copy a directory tree
    pub async fn copy_dir(&self, from: &Path, to: &Path) -> StrataResult<()> {
        if !from.is_dir() {
            return Err(StrataError::PathNotFound(from.to_path_buf()));
        }

        // WalkDir is synchronous; artifact trees are small enough that the
        // directory scan itself never suspends, only the copies do.
        let entries: Vec<(PathBuf, PathBuf)> = WalkDir::new(from)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(from).ok()?;
                Some((entry.path().to_path_buf(), to.join(rel)))
            })
            .collect();

        for (src, dst) in entries {
            if src.is_dir() {
                fs::create_dir_all(&dst)
                    .await
                    .map_err(|e| StrataError::io(format!("creating {}", dst.display()), e))?;
            } else {
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StrataError::io(format!("creating {}", parent.display()), e))?;
                }
                fs::copy(&src, &dst).await.map_err(|e| {
                    StrataError::io(
                        format!("copying {} to {}", src.display(), dst.display()),
                        e,
                    )
                })?;
            }
        }

        Ok(())
    }

    /// Move a fully-materialized directory into place, replacing any
    /// previous content at the destination.
    ///
    /// The rename is the commit point: readers either see the old tree or
    /// the complete new one, never a partial copy.
    pub async fn replace_dir(&self, staged: &Path, destination: &Path) -> StrataResult<()> {
        if destination.exists() {
            self.delete(destination).await?;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StrataError::io(format!("creating {}", parent.display()), e))?;
        }

        match fs::rename(staged, destination).await {
            Ok(()) => Ok(()),
            // Rename fails across filesystems; fall back to copy + delete.
            Err(_) => {
                self.copy_dir(staged, destination).await?;
                self.delete(staged).await
            }
        }
    }

    /// Delete a file or directory tree if it exists
    pub async fn delete(&self, path: &Path) -> StrataResult<()> {
        let metadata = match fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StrataError::io(format!("inspecting {}", path.display()), e)),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(path)
                .await
                .map_err(|e| StrataError::io(format!("removing {}", path.display()), e))
        } else {
            fs::remove_file(path)
                .await
                .map_err(|e| StrataError::io(format!("removing {}", path.display()), e))
        }
    }
}
