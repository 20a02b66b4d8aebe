//! Integration tests for Strata
//!
//! Full orchestration passes over tempdir-backed storages, a stub pin and
//! toolchain provider, and a recording builder.

mod support {
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata::builder::ArtifactBuilder;
    use strata::error::{StrataError, StrataResult};
    use strata::key::PinState;
    use strata::provider::{SourcePinProvider, ToolchainVersionProvider};
    use strata::storage::{CacheStorage, StorageAddress};
    use strata::target::CacheTarget;

    /// Install a test subscriber so warn-path output is visible under
    /// `--nocapture`; later calls are no-ops.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Pin provider answering a fixed revision for every package
    pub struct FixedPin;

    #[async_trait]
    impl SourcePinProvider for FixedPin {
        async fn pin(&self, _package: &str) -> StrataResult<PinState> {
            Ok(PinState::Revision {
                revision: "0f3a9c1".to_string(),
            })
        }
    }

    /// Pin provider that cannot pin one specific package
    pub struct SelectivePin {
        pub unpinnable: String,
    }

    #[async_trait]
    impl SourcePinProvider for SelectivePin {
        async fn pin(&self, package: &str) -> StrataResult<PinState> {
            if package == self.unpinnable {
                return Err(StrataError::RevisionNotDetected {
                    package: package.to_string(),
                    reason: "not a recognized checkout".to_string(),
                });
            }
            Ok(PinState::Revision {
                revision: "0f3a9c1".to_string(),
            })
        }
    }

    /// Toolchain provider answering a fixed fingerprint
    pub struct FixedToolchain(pub String);

    #[async_trait]
    impl ToolchainVersionProvider for FixedToolchain {
        async fn fetch_version(&self) -> StrataResult<String> {
            Ok(self.0.clone())
        }
    }

    /// Builder that materializes a marker file and counts invocations
    #[derive(Default)]
    pub struct RecordingBuilder {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactBuilder for RecordingBuilder {
        async fn build(&self, target: &CacheTarget, output_dir: &Path) -> StrataResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir_all(output_dir)
                .await
                .map_err(|e| StrataError::io("creating output dir", e))?;
            tokio::fs::write(output_dir.join("bundle.bin"), target.to_string())
                .await
                .map_err(|e| StrataError::io("writing bundle", e))
        }
    }

    impl RecordingBuilder {
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Storage wrapper that counts checks, fetches, and writes
    pub struct CountingStorage<S> {
        inner: S,
        pub checks: AtomicUsize,
        pub fetches: AtomicUsize,
        pub writes: AtomicUsize,
    }

    impl<S> CountingStorage<S> {
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                checks: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }
        }

        pub fn check_count(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<S: CacheStorage> CacheStorage for CountingStorage<S> {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn preferred_parallelism(&self) -> Option<usize> {
            self.inner.preferred_parallelism()
        }

        async fn exists_valid_cache(&self, address: &StorageAddress) -> StrataResult<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.inner.exists_valid_cache(address).await
        }

        async fn fetch_artifacts(
            &self,
            address: &StorageAddress,
            destination: &Path,
        ) -> StrataResult<()> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_artifacts(address, destination).await
        }

        async fn cache_artifact(
            &self,
            artifact: &Path,
            address: &StorageAddress,
        ) -> StrataResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.cache_artifact(artifact, address).await
        }
    }
}

mod orchestrator_tests {
    use super::support::*;
    use std::path::Path;
    use std::sync::Arc;
    use strata::key::{BuildOptions, Platform};
    use strata::orchestrator::{CacheOrchestrator, OrchestrationMode, TargetDisposition};
    use strata::policy::CachePolicy;
    use strata::storage::LocalDirectoryStorage;
    use strata::target::{BuildProduct, CacheTarget};
    use tempfile::TempDir;

    fn target(package: &str, unit: &str) -> CacheTarget {
        CacheTarget::new(
            BuildProduct::new(package, unit),
            BuildOptions::release([Platform::LinuxX86_64]),
        )
    }

    fn orchestrator(
        policies: Vec<CachePolicy>,
        builder: Arc<RecordingBuilder>,
        build_root: &Path,
    ) -> CacheOrchestrator {
        CacheOrchestrator::new(
            policies,
            builder,
            Arc::new(FixedPin),
            Arc::new(FixedToolchain("toolc 9.9.9".to_string())),
            build_root,
            OrchestrationMode::PrepareDependencies,
        )
    }

    #[tokio::test]
    async fn cold_pass_builds_and_writes_back() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(LocalDirectoryStorage::new("local", temp.path().join("cache")));
        let builder = Arc::new(RecordingBuilder::default());

        let orch = orchestrator(
            vec![CachePolicy::producer_and_consumer(storage)],
            builder.clone(),
            &temp.path().join("build"),
        );

        let report = orch.run(vec![target("net", "HttpClient")]).await.unwrap();

        assert!(!report.has_failures());
        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Built);
        assert_eq!(report.outcomes[0].produced_to, vec!["local".to_string()]);
        assert_eq!(builder.call_count(), 1);
    }

    #[tokio::test]
    async fn second_pass_validates_without_touching_storage() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let counting = Arc::new(CountingStorage::new(LocalDirectoryStorage::new(
            "local",
            temp.path().join("cache"),
        )));
        let builder = Arc::new(RecordingBuilder::default());
        let build_root = temp.path().join("build");

        let orch = orchestrator(
            vec![CachePolicy::producer_and_consumer(counting.clone())],
            builder.clone(),
            &build_root,
        );

        orch.run(vec![target("net", "HttpClient")]).await.unwrap();
        let checks_after_first = counting.check_count();
        let writes_after_first = counting.write_count();

        let report = orch.run(vec![target("net", "HttpClient")]).await.unwrap();

        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Validated);
        assert_eq!(builder.call_count(), 1);
        // Validation is sidecar-only: no further checks, no re-upload.
        assert_eq!(counting.check_count(), checks_after_first);
        assert_eq!(counting.write_count(), writes_after_first);
        assert!(report.outcomes[0].produced_to.is_empty());
    }

    #[tokio::test]
    async fn restore_prefers_earlier_storage_and_backfills() {
        init_tracing();
        // X valid on disk; Y missing, storage A (both, prio 1) misses,
        // storage B (consumer, prio 2) hits. Expect X validated, Y restored
        // from B, Y backfilled to A, never re-sent to B.
        let temp = TempDir::new().unwrap();
        let a = Arc::new(CountingStorage::new(LocalDirectoryStorage::new(
            "a",
            temp.path().join("cache-a"),
        )));
        let b = Arc::new(CountingStorage::new(LocalDirectoryStorage::new(
            "b",
            temp.path().join("cache-b"),
        )));
        let build_root = temp.path().join("build");

        // Seed B (and the build root sidecars) with a cold pass through B only.
        let seeder = Arc::new(RecordingBuilder::default());
        orchestrator(
            vec![CachePolicy::producer_and_consumer(b.clone())],
            seeder.clone(),
            &build_root,
        )
        .run(vec![target("net", "HttpClient"), target("ui", "Widgets")])
        .await
        .unwrap();
        assert_eq!(seeder.call_count(), 2);

        // Drop Y's on-disk output so only X validates.
        let builder = Arc::new(RecordingBuilder::default());
        let orch = orchestrator(
            vec![
                CachePolicy::producer_and_consumer(a.clone()),
                CachePolicy::consumer(b.clone()),
            ],
            builder.clone(),
            &build_root,
        );
        let y = target("ui", "Widgets");
        let y_dir = orch.output_dir(&y).unwrap();
        tokio::fs::remove_dir_all(&y_dir).await.unwrap();
        tokio::fs::remove_file(strata::sidecar::sidecar_path(&y_dir))
            .await
            .unwrap();

        let b_writes_before = b.write_count();
        let report = orch
            .run(vec![target("net", "HttpClient"), y.clone()])
            .await
            .unwrap();

        assert_eq!(
            report.outcomes[0].disposition,
            TargetDisposition::Validated
        );
        assert_eq!(
            report.outcomes[1].disposition,
            TargetDisposition::Restored {
                storage: "b".to_string()
            }
        );
        assert_eq!(builder.call_count(), 0);

        // Backfill reached A; B was never re-sent the entry.
        assert_eq!(report.outcomes[1].produced_to, vec!["a".to_string()]);
        assert_eq!(b.write_count(), b_writes_before);

        // A second identical pass for Y hits A directly with no new writes.
        tokio::fs::remove_dir_all(&y_dir).await.unwrap();
        tokio::fs::remove_file(strata::sidecar::sidecar_path(&y_dir))
            .await
            .unwrap();
        let a_writes_before = a.write_count();
        let report = orch.run(vec![y]).await.unwrap();
        assert_eq!(
            report.outcomes[0].disposition,
            TargetDisposition::Restored {
                storage: "a".to_string()
            }
        );
        assert_eq!(a.write_count(), a_writes_before);
        assert!(report.outcomes[0].produced_to.is_empty());
    }

    #[tokio::test]
    async fn unpinnable_target_does_not_poison_batch() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(LocalDirectoryStorage::new("local", temp.path().join("cache")));
        let builder = Arc::new(RecordingBuilder::default());

        let orch = CacheOrchestrator::new(
            vec![CachePolicy::producer_and_consumer(storage)],
            builder.clone(),
            Arc::new(SelectivePin {
                unpinnable: "vendored".to_string(),
            }),
            Arc::new(FixedToolchain("toolc 9.9.9".to_string())),
            temp.path().join("build"),
            OrchestrationMode::PrepareDependencies,
        );

        let good = target("net", "HttpClient");
        let report = orch
            .run(vec![target("vendored", "Blob"), good.clone()])
            .await
            .unwrap();

        assert!(report.has_failures());
        assert!(matches!(
            report.outcomes[0].disposition,
            TargetDisposition::Failed { .. }
        ));
        assert_eq!(
            report.outcome_for(&good).unwrap().disposition,
            TargetDisposition::Built
        );
        assert_eq!(builder.call_count(), 1);
    }

    #[tokio::test]
    async fn system_version_partitions_the_cache() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(LocalDirectoryStorage::new("local", temp.path().join("cache")));
        let builder = Arc::new(RecordingBuilder::default());

        let on_version = |system: &str, root: &str| {
            orchestrator(
                vec![CachePolicy::producer_and_consumer(storage.clone())],
                builder.clone(),
                &temp.path().join(root),
            )
            .with_system_version(system)
        };

        on_version("os-14", "build-1")
            .run(vec![target("net", "HttpClient")])
            .await
            .unwrap();
        assert_eq!(builder.call_count(), 1);

        // A different host system version is a different key: clean miss.
        let report = on_version("os-15", "build-2")
            .run(vec![target("net", "HttpClient")])
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Built);
        assert_eq!(builder.call_count(), 2);

        // The original version still restores its own entry.
        let report = on_version("os-14", "build-3")
            .run(vec![target("net", "HttpClient")])
            .await
            .unwrap();
        assert_eq!(
            report.outcomes[0].disposition,
            TargetDisposition::Restored {
                storage: "local".to_string()
            }
        );
        assert_eq!(builder.call_count(), 2);
    }

    #[tokio::test]
    async fn toolchain_change_invalidates_on_disk_output() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let build_root = temp.path().join("build");
        let builder = Arc::new(RecordingBuilder::default());

        let old = CacheOrchestrator::new(
            Vec::new(),
            builder.clone(),
            Arc::new(FixedPin),
            Arc::new(FixedToolchain("toolc 9.9.9".to_string())),
            &build_root,
            OrchestrationMode::PrepareDependencies,
        );
        old.run(vec![target("net", "HttpClient")]).await.unwrap();
        assert_eq!(builder.call_count(), 1);

        let new = CacheOrchestrator::new(
            Vec::new(),
            builder.clone(),
            Arc::new(FixedPin),
            Arc::new(FixedToolchain("toolc 10.0.0".to_string())),
            &build_root,
            OrchestrationMode::PrepareDependencies,
        );
        let report = new.run(vec![target("net", "HttpClient")]).await.unwrap();

        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Built);
        assert_eq!(builder.call_count(), 2);
    }

    #[tokio::test]
    async fn assembly_mode_writes_no_sidecars() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(LocalDirectoryStorage::new("local", temp.path().join("cache")));
        let builder = Arc::new(RecordingBuilder::default());
        let build_root = temp.path().join("build");

        let orch = CacheOrchestrator::new(
            vec![CachePolicy::producer_and_consumer(storage)],
            builder.clone(),
            Arc::new(FixedPin),
            Arc::new(FixedToolchain("toolc 9.9.9".to_string())),
            &build_root,
            OrchestrationMode::AssembleApplication,
        );

        let t = target("app", "Main");
        orch.run(vec![t.clone()]).await.unwrap();
        assert!(!strata::sidecar::sidecar_path(&orch.output_dir(&t).unwrap()).exists());

        // Without a sidecar the next pass cannot validate; the entry comes
        // back from the cache instead.
        let report = orch.run(vec![t]).await.unwrap();
        assert_eq!(
            report.outcomes[0].disposition,
            TargetDisposition::Restored {
                storage: "local".to_string()
            }
        );
        assert_eq!(builder.call_count(), 1);
    }

    #[tokio::test]
    async fn no_consumer_chain_always_builds() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let builder = Arc::new(RecordingBuilder::default());

        let orch = orchestrator(Vec::new(), builder.clone(), &temp.path().join("build"));

        let report = orch.run(vec![target("net", "HttpClient")]).await.unwrap();
        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Built);
        assert!(report.outcomes[0].produced_to.is_empty());
        assert_eq!(builder.call_count(), 1);
    }
}

mod config_tests {
    use super::support::*;
    use std::sync::Arc;
    use strata::config::{build_orchestrator, ConfigManager};
    use strata::key::{BuildOptions, Platform};
    use strata::orchestrator::{OrchestrationMode, TargetDisposition};
    use strata::target::{BuildProduct, CacheTarget};
    use tempfile::TempDir;

    #[tokio::test]
    async fn orchestrator_from_config_uses_configured_paths() {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let workspace = temp.path();
        let config_file = workspace.join("strata.toml");
        std::fs::write(
            &config_file,
            r#"
[build]
output_dir = "out/artifacts"

[[policies]]
kind = "project"
path = "cache/local"
roles = "both"
"#,
        )
        .unwrap();

        let config = ConfigManager::new()
            .load_from_file(&config_file)
            .await
            .unwrap();

        let builder = Arc::new(RecordingBuilder::default());
        let orch = build_orchestrator(
            &config,
            workspace,
            builder.clone(),
            Arc::new(FixedPin),
            OrchestrationMode::PrepareDependencies,
        )
        .unwrap();

        let target = CacheTarget::new(
            BuildProduct::new("net", "HttpClient"),
            BuildOptions::release([Platform::LinuxX86_64]),
        );
        let report = orch.run(vec![target.clone()]).await.unwrap();
        assert_eq!(report.outcomes[0].disposition, TargetDisposition::Built);
        assert_eq!(builder.call_count(), 1);

        // The configured output root was used for the build.
        let output = orch.output_dir(&target).unwrap();
        assert!(output.starts_with(workspace.join("out/artifacts")));
        assert!(output.join("bundle.bin").exists());

        // The configured project cache received the write-back.
        assert!(workspace.join("cache/local").join("HttpClient").is_dir());
    }
}
