//! External builder seam
//!
//! The orchestrator decides *whether* a target needs building, never *how*.
//! The actual compile/archive step lives behind this trait and is invoked
//! only for true cache misses.

use crate::error::StrataResult;
use crate::target::CacheTarget;
use async_trait::async_trait;
use std::path::Path;

/// Produces a binary artifact bundle for one cache target
///
/// The orchestrator treats the builder as opaque: success means the artifact
/// is fully materialized under `output_dir`; failure is fatal for that target
/// and is never retried, but it does not abort sibling targets.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, target: &CacheTarget, output_dir: &Path) -> StrataResult<()>;
}
