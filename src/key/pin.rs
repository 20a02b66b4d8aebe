//! Source pin states
//!
//! A pin describes exactly which source snapshot produced a buildable unit.
//! Cache keys embed the pin so that two checkouts of the same package at
//! different revisions never share an artifact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exactly which source snapshot a unit was built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PinState {
    /// A bare commit (detached checkout, no tag or branch)
    Revision { revision: String },
    /// A released version tag resolved to a commit
    Version { version: String, revision: String },
    /// A branch head resolved to a commit
    Branch { branch: String, revision: String },
}

impl PinState {
    /// The underlying commit revision, whichever form the pin takes
    pub fn revision(&self) -> &str {
        match self {
            Self::Revision { revision }
            | Self::Version { revision, .. }
            | Self::Branch { revision, .. } => revision,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revision { revision } => write!(f, "{}", revision),
            Self::Version { version, revision } => write!(f, "{}@{}", version, revision),
            Self::Branch { branch, revision } => write!(f, "{}@{}", branch, revision),
        }
    }
}
