//! Source pin and toolchain version providers
//!
//! Cache key computation needs two facts the orchestrator cannot derive
//! itself: which exact source snapshot a package sits at, and which compiler
//! will build it. Both are queried from external tools behind small traits so
//! tests can substitute fixed answers.

use crate::error::{StrataError, StrataResult};
use crate::key::PinState;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

/// Resolves a package to the exact source snapshot it sits at
#[async_trait]
pub trait SourcePinProvider: Send + Sync {
    /// Pin a package, or fail with `RevisionNotDetected` for that package
    async fn pin(&self, package: &str) -> StrataResult<PinState>;
}

/// Reports the active compiler/toolchain version string
#[async_trait]
pub trait ToolchainVersionProvider: Send + Sync {
    async fn fetch_version(&self) -> StrataResult<String>;
}

/// Pin provider backed by git checkouts under a common root
///
/// Each package is expected at `{checkouts_root}/{package}`. The pin form is
/// chosen from what git reports: an exact version tag wins, then a named
/// branch, then the bare revision (detached HEAD).
pub struct GitPinProvider {
    checkouts_root: PathBuf,
}

impl GitPinProvider {
    pub fn new(checkouts_root: impl Into<PathBuf>) -> Self {
        Self {
            checkouts_root: checkouts_root.into(),
        }
    }

    /// Run a git subcommand in a package checkout, returning trimmed stdout
    async fn git(&self, package: &str, args: &[&str]) -> StrataResult<Option<String>> {
        let dir = self.checkouts_root.join(package);
        debug!("Executing in {}: git {:?}", dir.display(), args);

        let output = Command::new("git")
            .arg("-C")
            .arg(&dir)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StrataError::command_failed(format!("git {:?}", args), e))?;

        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(stdout))
        }
    }
}

#[async_trait]
impl SourcePinProvider for GitPinProvider {
    async fn pin(&self, package: &str) -> StrataResult<PinState> {
        let revision = self.git(package, &["rev-parse", "HEAD"]).await?.ok_or_else(|| {
            StrataError::RevisionNotDetected {
                package: package.to_string(),
                reason: format!(
                    "{} is not a git checkout",
                    self.checkouts_root.join(package).display()
                ),
            }
        })?;

        if let Some(version) = self
            .git(package, &["describe", "--tags", "--exact-match"])
            .await?
        {
            return Ok(PinState::Version { version, revision });
        }

        match self.git(package, &["rev-parse", "--abbrev-ref", "HEAD"]).await? {
            Some(branch) if branch != "HEAD" => Ok(PinState::Branch { branch, revision }),
            _ => Ok(PinState::Revision { revision }),
        }
    }
}

/// Toolchain provider that shells out to the compiler
///
/// Runs `{program} {args}` once and validates that the first whitespace
/// token shaped like a version actually parses as one.
pub struct CommandToolchainProvider {
    program: String,
    args: Vec<String>,
}

impl CommandToolchainProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Provider for the Rust toolchain (`rustc --version`)
    pub fn rustc() -> Self {
        Self::new("rustc", vec!["--version".to_string()])
    }

    /// Extract and validate the version token from raw `--version` output
    fn parse_version(output: &str) -> Option<String> {
        let line = output.lines().next()?;
        line.split_whitespace()
            .find(|token| {
                let bare = token.split('-').next().unwrap_or(token);
                semver::Version::parse(bare).is_ok()
            })
            .map(|_| line.trim().to_string())
    }
}

#[async_trait]
impl ToolchainVersionProvider for CommandToolchainProvider {
    async fn fetch_version(&self) -> StrataResult<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StrataError::ToolchainUnavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StrataError::ToolchainUnavailable(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_version(&stdout).ok_or_else(|| StrataError::ToolchainVersionNotDetected {
            output: stdout.trim().to_string(),
        })
    }
}

/// Memoizing wrapper around any toolchain provider
///
/// The toolchain version is invariant across targets, so one orchestration
/// pass queries the underlying provider at most once.
pub struct MemoizedToolchain {
    inner: Arc<dyn ToolchainVersionProvider>,
    cached: OnceCell<String>,
}

impl MemoizedToolchain {
    pub fn new(inner: Arc<dyn ToolchainVersionProvider>) -> Self {
        Self {
            inner,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ToolchainVersionProvider for MemoizedToolchain {
    async fn fetch_version(&self) -> StrataResult<String> {
        let version = self
            .cached
            .get_or_try_init(|| self.inner.fetch_version())
            .await?;
        Ok(version.clone())
    }
}
