//! Cache orchestration
//!
//! The same tiered restore/backfill algorithm instantiated at two
//! granularities: per buildable unit (artifact cache) and per resolved
//! dependency graph (resolution cache).

mod artifact;
mod resolution;
mod tiered;

pub use artifact::{
    CacheOrchestrator, OrchestrationMode, PassReport, TargetDisposition, TargetOutcome,
};
pub use resolution::ResolutionCache;
pub use tiered::{RestoreRequest, RestoredEntry, RestoreOutcome, StoreOutcome, StoreRequest, TieredCache};

/// Fan-out width for artifact cache stages when a backend states no preference
pub const DEFAULT_ARTIFACT_PARALLELISM: usize = 8;

/// Fan-out width for resolution cache stages when a backend states no preference
pub const DEFAULT_RESOLUTION_PARALLELISM: usize = 4;
