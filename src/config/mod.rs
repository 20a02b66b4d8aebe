//! Configuration management for Strata

pub mod schema;

pub use schema::{Config, PolicyConfig, StorageKind, ToolchainConfig};

use crate::builder::ArtifactBuilder;
use crate::error::{StrataError, StrataResult};
use crate::orchestrator::{CacheOrchestrator, OrchestrationMode};
use crate::policy::CachePolicy;
use crate::provider::{CommandToolchainProvider, SourcePinProvider};
use crate::storage::{HttpObjectStorage, LocalDirectoryStorage, PassthroughStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
            .join("config.toml")
    }

    /// Get the system cache root
    pub fn system_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata")
            .join("artifacts")
    }

    /// Load configuration, using defaults if no file exists
    pub async fn load(&self) -> StrataResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StrataResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StrataError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| StrataError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> StrataResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            StrataError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> StrataResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StrataError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the policy chain described by a configuration.
///
/// Policy order in the file is the fallback priority order. Project-kind
/// paths resolve against `workspace_root`; system-kind paths default to the
/// user cache dir.
pub fn build_policies(config: &Config, workspace_root: &Path) -> StrataResult<Vec<CachePolicy>> {
    config
        .policies
        .iter()
        .map(|policy| build_policy(policy, workspace_root))
        .collect()
}

/// Assemble an orchestrator from a configuration.
///
/// The policy chain, build root, and toolchain query all come from the
/// config; the builder and pin provider are the caller's collaborators.
/// A relative `build.output_dir` resolves against `workspace_root`.
pub fn build_orchestrator(
    config: &Config,
    workspace_root: &Path,
    builder: Arc<dyn ArtifactBuilder>,
    pin_provider: Arc<dyn SourcePinProvider>,
    mode: OrchestrationMode,
) -> StrataResult<CacheOrchestrator> {
    let policies = build_policies(config, workspace_root)?;

    let build_root = if config.build.output_dir.is_absolute() {
        config.build.output_dir.clone()
    } else {
        workspace_root.join(&config.build.output_dir)
    };

    let toolchain = Arc::new(CommandToolchainProvider::new(
        config.toolchain.program.clone(),
        config.toolchain.args.clone(),
    ));

    Ok(CacheOrchestrator::new(
        policies,
        builder,
        pin_provider,
        toolchain,
        build_root,
        mode,
    ))
}

fn build_policy(policy: &PolicyConfig, workspace_root: &Path) -> StrataResult<CachePolicy> {
    let storage: Arc<dyn crate::storage::CacheStorage> = match policy.kind {
        StorageKind::Project => {
            let path = policy
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".strata/cache"));
            let root = if path.is_absolute() {
                path
            } else {
                workspace_root.join(path)
            };
            let name = policy.name.clone().unwrap_or_else(|| "project".to_string());
            Arc::new(with_parallelism(
                LocalDirectoryStorage::new(name, root),
                policy.parallelism,
            ))
        }
        StorageKind::System => {
            let root = policy
                .path
                .clone()
                .unwrap_or_else(ConfigManager::system_cache_dir);
            let name = policy.name.clone().unwrap_or_else(|| "system".to_string());
            Arc::new(with_parallelism(
                LocalDirectoryStorage::new(name, root),
                policy.parallelism,
            ))
        }
        StorageKind::Remote => {
            let url = policy.url.clone().ok_or_else(|| {
                StrataError::PolicyInvalid("remote policy requires a url".to_string())
            })?;
            let name = policy.name.clone().unwrap_or_else(|| "remote".to_string());
            let storage = HttpObjectStorage::new(name, url);
            match policy.parallelism {
                Some(p) => Arc::new(storage.with_parallelism(p)),
                None => Arc::new(storage),
            }
        }
        StorageKind::Passthrough => Arc::new(PassthroughStorage::new()),
    };

    debug!("cache policy '{}' acting as {}", storage.name(), policy.roles);
    Ok(CachePolicy::new(storage, policy.roles))
}

fn with_parallelism(
    storage: LocalDirectoryStorage,
    parallelism: Option<usize>,
) -> LocalDirectoryStorage {
    match parallelism {
        Some(p) => storage.with_parallelism(p),
        None => storage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CacheRoles;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.policies.len(), 2);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.toolchain.program = "swiftc".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.toolchain.program, "swiftc");
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "policies = 3").unwrap();

        let manager = ConfigManager::with_path(path.clone());
        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, StrataError::ConfigInvalid { .. }));
    }

    #[test]
    fn build_policies_preserves_order_and_roles() {
        let temp = TempDir::new().unwrap();
        let config: Config = toml::from_str(
            r#"
            [[policies]]
            kind = "project"
            roles = "both"

            [[policies]]
            kind = "remote"
            url = "https://cache.example.com"
            roles = "consumer"
            name = "team"
            "#,
        )
        .unwrap();

        let policies = build_policies(&config, temp.path()).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].storage.name(), "project");
        assert_eq!(policies[0].roles, CacheRoles::Both);
        assert_eq!(policies[1].storage.name(), "team");
        assert_eq!(policies[1].roles, CacheRoles::Consumer);
    }

    #[test]
    fn remote_without_url_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config: Config = toml::from_str(
            r#"
            [[policies]]
            kind = "remote"
            "#,
        )
        .unwrap();

        let err = build_policies(&config, temp.path()).unwrap_err();
        assert!(matches!(err, StrataError::PolicyInvalid(_)));
    }

    #[test]
    fn passthrough_policy_builds() {
        let temp = TempDir::new().unwrap();
        let config: Config = toml::from_str(
            r#"
            [[policies]]
            kind = "passthrough"
            "#,
        )
        .unwrap();

        let policies = build_policies(&config, temp.path()).unwrap();
        assert_eq!(policies[0].storage.name(), "passthrough");
    }
}
