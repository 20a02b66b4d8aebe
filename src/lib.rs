//! Strata - Tiered Binary Artifact Cache Orchestrator
//!
//! Decides, for every buildable unit, whether an existing artifact can be
//! reused, where it should be fetched from, and where freshly built
//! artifacts are written back. Never serves a stale artifact; tolerates
//! independently-failing storage backends; overlaps I/O across targets.

pub mod builder;
pub mod config;
pub mod error;
pub mod key;
pub mod mover;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod sidecar;
pub mod storage;
pub mod target;

pub use error::{StrataError, StrataResult};
pub use orchestrator::{CacheOrchestrator, OrchestrationMode, PassReport, ResolutionCache};
