//! Configuration schema for Strata
//!
//! Configuration is stored at `~/.config/strata/config.toml`

use crate::policy::CacheRoles;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build output settings
    pub build: BuildConfig,

    /// Toolchain query settings
    pub toolchain: ToolchainConfig,

    /// Cache policy chain, highest priority first
    pub policies: Vec<PolicyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            toolchain: ToolchainConfig::default(),
            policies: vec![
                PolicyConfig::local(StorageKind::Project),
                PolicyConfig::local(StorageKind::System),
            ],
        }
    }
}

/// Build output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Root of materialized artifact outputs, relative to the workspace
    pub output_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("build/artifacts"),
        }
    }
}

/// How to query the active toolchain version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler executable
    pub program: String,

    /// Arguments producing a version string
    pub args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "rustc".to_string(),
            args: vec!["--version".to_string()],
        }
    }
}

/// Kind of storage backing one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Directory inside the workspace
    Project,
    /// Directory under the user cache dir
    System,
    /// HTTP object store
    Remote,
    /// No external store; the output directory itself is the cache
    Passthrough,
}

/// One entry of the cache policy chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Backend kind
    pub kind: StorageKind,

    /// Display name; defaults to the kind name
    #[serde(default)]
    pub name: Option<String>,

    /// Directory override for project/system kinds
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Base URL, required for the remote kind
    #[serde(default)]
    pub url: Option<String>,

    /// Roles this storage plays
    #[serde(default = "default_roles")]
    pub roles: CacheRoles,

    /// Preferred fan-out width for this backend
    #[serde(default)]
    pub parallelism: Option<usize>,
}

fn default_roles() -> CacheRoles {
    CacheRoles::Both
}

impl PolicyConfig {
    fn local(kind: StorageKind) -> Self {
        Self {
            kind,
            name: None,
            path: None,
            url: None,
            roles: CacheRoles::Both,
            parallelism: None,
        }
    }
}
