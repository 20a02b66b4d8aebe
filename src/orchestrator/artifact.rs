//! Artifact cache orchestration
//!
//! One orchestration pass over a batch of cache targets: validate what is
//! already on disk, restore what any consumer storage holds, build the true
//! misses, write fresh artifacts to producers, backfill storages that missed
//! a hit found later in the chain, and persist sidecars for the next pass.
//!
//! Target sets move between stages only at stage boundaries, after every
//! worker of the current stage has joined. Caching never blocks correctness:
//! if every storage fails, a target simply gets built.

use crate::builder::ArtifactBuilder;
use crate::error::StrataResult;
use crate::key::{ArtifactKey, PinState};
use crate::mover::ArtifactMover;
use crate::orchestrator::tiered::{RestoreRequest, StoreRequest, TieredCache};
use crate::orchestrator::DEFAULT_ARTIFACT_PARALLELISM;
use crate::policy::CachePolicy;
use crate::provider::{MemoizedToolchain, SourcePinProvider, ToolchainVersionProvider};
use crate::sidecar;
use crate::storage::StorageAddress;
use crate::target::CacheTarget;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a pass is preparing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationMode {
    /// Building dependency bundles ahead of use; sidecars are persisted so
    /// the next pass can validate outputs without storage round-trips.
    PrepareDependencies,
    /// Assembling the final application; outputs are consumed immediately
    /// and no sidecars are written.
    AssembleApplication,
}

/// How one target was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDisposition {
    /// On-disk artifact matched its sidecar; nothing was done
    Validated,
    /// Fetched from the named consumer storage
    Restored { storage: String },
    /// Built by the external builder
    Built,
    /// Fatal per-target failure (key computation or build)
    Failed { reason: String },
}

/// Per-target result of one orchestration pass
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target: CacheTarget,
    pub disposition: TargetDisposition,
    /// Producer storages that accepted this target's artifact this pass
    /// (write-back for built targets, backfill for restored ones)
    pub produced_to: Vec<String>,
}

/// Aggregate result of one orchestration pass
#[derive(Debug)]
pub struct PassReport {
    /// One outcome per requested target, in request order
    pub outcomes: Vec<TargetOutcome>,
}

impl PassReport {
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.disposition, TargetDisposition::Failed { .. }))
    }

    pub fn outcome_for(&self, target: &CacheTarget) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| &o.target == target)
    }
}

/// A target with its computed key, address, and output location
#[derive(Debug, Clone)]
struct KeyedTarget {
    /// Position in the requested batch
    index: usize,
    target: CacheTarget,
    key: ArtifactKey,
    address: StorageAddress,
    output_dir: PathBuf,
}

/// The tiered artifact cache orchestrator
pub struct CacheOrchestrator {
    tiered: TieredCache,
    builder: Arc<dyn ArtifactBuilder>,
    pin_provider: Arc<dyn SourcePinProvider>,
    toolchain: MemoizedToolchain,
    mover: ArtifactMover,
    build_root: PathBuf,
    system_version: Option<String>,
    mode: OrchestrationMode,
}

impl CacheOrchestrator {
    pub fn new(
        policies: Vec<CachePolicy>,
        builder: Arc<dyn ArtifactBuilder>,
        pin_provider: Arc<dyn SourcePinProvider>,
        toolchain_provider: Arc<dyn ToolchainVersionProvider>,
        build_root: impl Into<PathBuf>,
        mode: OrchestrationMode,
    ) -> Self {
        Self {
            tiered: TieredCache::new(policies, DEFAULT_ARTIFACT_PARALLELISM),
            builder,
            pin_provider,
            toolchain: MemoizedToolchain::new(toolchain_provider),
            mover: ArtifactMover::new(),
            build_root: build_root.into(),
            system_version: None,
            mode,
        }
    }

    /// Record the host system version in every key this orchestrator computes
    pub fn with_system_version(mut self, version: impl Into<String>) -> Self {
        self.system_version = Some(version.into());
        self
    }

    /// Output directory for a target; the options digest keeps distinct
    /// option sets of one unit in distinct directories.
    pub fn output_dir(&self, target: &CacheTarget) -> StrataResult<PathBuf> {
        Ok(self
            .build_root
            .join(&target.product.package)
            .join(format!(
                "{}-{}",
                target.product.unit,
                target.options.digest8()?
            )))
    }

    /// Run one orchestration pass over a batch of targets
    pub async fn run(&self, targets: Vec<CacheTarget>) -> StrataResult<PassReport> {
        let total = targets.len();
        let mut dispositions: Vec<Option<TargetDisposition>> = vec![None; total];
        let mut produced_to: Vec<Vec<String>> = vec![Vec::new(); total];

        // Stage 1: cache keys. A failure here excludes that target from all
        // later stages without touching its siblings.
        let keyed = self.compute_keys(&targets, &mut dispositions).await;

        // Stage 2: validate already-materialized outputs against sidecars.
        let (valid, unvalidated) = self.validate(keyed).await;
        for kt in &valid {
            debug!("{} validated in place, skipping", kt.target);
            dispositions[kt.index] = Some(TargetDisposition::Validated);
        }

        // Stage 3: restore from consumer storages in priority order.
        let requests = unvalidated
            .into_iter()
            .map(|kt| RestoreRequest {
                address: kt.address.clone(),
                destination: kt.output_dir.clone(),
                id: kt,
            })
            .collect();
        let restore = self.tiered.restore(requests).await;
        for entry in &restore.restored {
            dispositions[entry.request.id.index] = Some(TargetDisposition::Restored {
                storage: entry.storage_name.clone(),
            });
        }
        let remaining: Vec<KeyedTarget> = restore.remaining.into_iter().map(|r| r.id).collect();

        // Stage 4: build true misses. Builder failures are fatal-per-target;
        // the batch always drains before anything is reported.
        let built = self.build(remaining, &mut dispositions).await;

        // Stage 5: write built artifacts to every producer storage. Only
        // built targets are uploaded; validated and restored ones never are.
        let store_requests = built
            .iter()
            .map(|kt| StoreRequest {
                id: kt.index,
                address: kt.address.clone(),
                artifact: kt.output_dir.clone(),
            })
            .collect();
        for outcome in self.tiered.store(store_requests).await {
            produced_to[outcome.id] = outcome.produced_to;
        }

        // Stage 6: backfill earlier-priority producers that missed a hit
        // found further down the chain.
        for outcome in self.tiered.backfill(&restore.restored).await {
            produced_to[outcome.id.index] = outcome.produced_to;
        }

        // Stage 7: sidecars, in dependency-preparation mode only. A failure
        // just means no validation short-circuit for that target next pass.
        if self.mode == OrchestrationMode::PrepareDependencies {
            let restored_targets: Vec<&KeyedTarget> =
                restore.restored.iter().map(|e| &e.request.id).collect();
            self.persist_sidecars(
                valid
                    .iter()
                    .chain(restored_targets.into_iter())
                    .chain(built.iter()),
            )
            .await;
        }

        let outcomes = targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| TargetOutcome {
                target,
                disposition: dispositions[index].clone().unwrap_or_else(|| {
                    TargetDisposition::Failed {
                        reason: "target was never resolved".to_string(),
                    }
                }),
                produced_to: std::mem::take(&mut produced_to[index]),
            })
            .collect();

        let report = PassReport { outcomes };
        info!(
            "cache pass complete: {} targets, {} failed",
            total,
            report
                .outcomes
                .iter()
                .filter(|o| matches!(o.disposition, TargetDisposition::Failed { .. }))
                .count()
        );
        Ok(report)
    }

    /// Compute keys for every target; per-target failures land in
    /// `dispositions`, successes come back keyed.
    async fn compute_keys(
        &self,
        targets: &[CacheTarget],
        dispositions: &mut [Option<TargetDisposition>],
    ) -> Vec<KeyedTarget> {
        // The toolchain fingerprint is invariant across targets. If it cannot
        // be determined at all, every target fails the same way.
        let fingerprint = match self.toolchain.fetch_version().await {
            Ok(v) => v,
            Err(e) => {
                for slot in dispositions.iter_mut() {
                    *slot = Some(TargetDisposition::Failed {
                        reason: e.to_string(),
                    });
                }
                return Vec::new();
            }
        };

        // One pin query per distinct package per pass.
        let mut pins: HashMap<String, StrataResult<PinState>> = HashMap::new();
        for target in targets {
            if !pins.contains_key(&target.product.package) {
                let pin = self.pin_provider.pin(&target.product.package).await;
                pins.insert(target.product.package.clone(), pin);
            }
        }

        let mut keyed = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let pin = match &pins[&target.product.package] {
                Ok(pin) => pin.clone(),
                Err(e) => {
                    warn!("excluding {} from pass: {}", target, e);
                    dispositions[index] = Some(TargetDisposition::Failed {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let key = ArtifactKey {
                unit_name: target.product.unit.clone(),
                source: pin,
                options: target.options.clone(),
                toolchain_fingerprint: fingerprint.clone(),
                system_version: self.system_version.clone(),
            };

            let (address, output_dir) = match (StorageAddress::from_key(&key), self.output_dir(target))
            {
                (Ok(address), Ok(output_dir)) => (address, output_dir),
                (Err(e), _) | (_, Err(e)) => {
                    dispositions[index] = Some(TargetDisposition::Failed {
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            keyed.push(KeyedTarget {
                index,
                target: target.clone(),
                key,
                address,
                output_dir,
            });
        }
        keyed
    }

    /// Split targets into (valid-on-disk, needs-restore). Stale outputs and
    /// their sidecars are deleted so they cannot be mistaken for valid later.
    async fn validate(&self, keyed: Vec<KeyedTarget>) -> (Vec<KeyedTarget>, Vec<KeyedTarget>) {
        let mut join_set: JoinSet<(KeyedTarget, bool)> = JoinSet::new();
        let mut pending = keyed.into_iter();
        let mut valid = Vec::new();
        let mut unvalidated = Vec::new();

        loop {
            while join_set.len() < DEFAULT_ARTIFACT_PARALLELISM {
                let Some(kt) = pending.next() else { break };
                let mover = self.mover.clone();
                join_set.spawn(async move {
                    if kt.output_dir.is_dir() {
                        let recorded: Option<ArtifactKey> = sidecar::read_key(&kt.output_dir).await;
                        if recorded.as_ref() == Some(&kt.key) {
                            return (kt, true);
                        }
                        debug!("{}: stale output, discarding", kt.target);
                        if let Err(e) = mover.delete(&kt.output_dir).await {
                            warn!("could not delete stale output for {}: {}", kt.target, e);
                        }
                    }
                    if let Err(e) = sidecar::remove(&kt.output_dir).await {
                        warn!("could not remove stale sidecar for {}: {}", kt.target, e);
                    }
                    (kt, false)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            match joined {
                Ok((kt, true)) => valid.push(kt),
                Ok((kt, false)) => unvalidated.push(kt),
                Err(e) => warn!("validation worker panicked: {}", e),
            }
        }

        (valid, unvalidated)
    }

    /// Build the remaining targets with bounded fan-out. Returns the subset
    /// that built successfully; failures are recorded in `dispositions`.
    async fn build(
        &self,
        remaining: Vec<KeyedTarget>,
        dispositions: &mut [Option<TargetDisposition>],
    ) -> Vec<KeyedTarget> {
        let mut join_set: JoinSet<(KeyedTarget, StrataResult<()>)> = JoinSet::new();
        let mut pending = remaining.into_iter();
        let mut built = Vec::new();

        loop {
            while join_set.len() < DEFAULT_ARTIFACT_PARALLELISM {
                let Some(kt) = pending.next() else { break };
                let builder = Arc::clone(&self.builder);
                join_set.spawn(async move {
                    info!("building {}", kt.target);
                    let result = builder.build(&kt.target, &kt.output_dir).await;
                    (kt, result)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            match joined {
                Ok((kt, Ok(()))) => {
                    dispositions[kt.index] = Some(TargetDisposition::Built);
                    built.push(kt);
                }
                Ok((kt, Err(e))) => {
                    warn!("build failed for {}: {}", kt.target, e);
                    dispositions[kt.index] = Some(TargetDisposition::Failed {
                        reason: e.to_string(),
                    });
                }
                Err(e) => warn!("build worker panicked: {}", e),
            }
        }

        built
    }

    /// Stamp every surviving target's output with its current key
    async fn persist_sidecars(&self, targets: impl Iterator<Item = &KeyedTarget>) {
        for kt in targets {
            if let Err(e) = sidecar::write_key(&kt.output_dir, &kt.key).await {
                warn!("could not persist sidecar for {}: {}", kt.target, e);
            }
        }
    }
}
