//! Build option value objects
//!
//! Everything that affects the produced binary beyond the source snapshot:
//! configuration, platform set, linkage, debug symbols, extra flags. Fully
//! value-comparable; two targets with different options never share a cache
//! entry.

use crate::error::StrataResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    Debug,
    Release,
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// How the produced bundle links against its dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Static,
    Dynamic,
}

/// Target platform for a produced bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    LinuxX86_64,
    LinuxAarch64,
    MacosX86_64,
    MacosAarch64,
    WindowsX86_64,
}

/// Resolved build options for one cache target
///
/// The platform set is a `BTreeSet` so option equality (and the canonical
/// serialization feeding the key checksum) is independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildOptions {
    pub configuration: BuildConfiguration,
    pub platforms: BTreeSet<Platform>,
    pub linkage: Linkage,
    pub embed_debug_symbols: bool,
    pub extra_flags: Vec<String>,
}

impl BuildOptions {
    /// Options for a plain release build of the given platforms
    pub fn release(platforms: impl IntoIterator<Item = Platform>) -> Self {
        Self {
            configuration: BuildConfiguration::Release,
            platforms: platforms.into_iter().collect(),
            linkage: Linkage::Static,
            embed_debug_symbols: false,
            extra_flags: Vec::new(),
        }
    }

    /// Short content digest of the option set, used to keep distinct option
    /// sets of one unit in distinct output directories.
    pub fn digest8(&self) -> StrataResult<String> {
        let full = crate::key::canonical_checksum(self)?;
        Ok(full[..8].to_string())
    }
}
