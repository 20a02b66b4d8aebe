//! Generic tiered cache engine
//!
//! The restore / backfill / write-back algorithm, shared by the artifact
//! cache (many targets per pass) and the resolution cache (one logical
//! entry). Policies are walked strictly in priority order; within one
//! storage, entries fan out with a bounded task window. All storage failures
//! here are soft: logged and treated as misses for that storage only.
//!
//! Stage-local results are merged only after every worker of the current
//! stage has joined. The shared entry sets are never mutated mid-stage.

use crate::error::StrataResult;
use crate::policy::CachePolicy;
use crate::storage::{CacheStorage, StorageAddress};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One entry to restore: where it lives in the cache and where it lands
#[derive(Debug, Clone)]
pub struct RestoreRequest<T> {
    /// Caller's handle for the entry, returned unchanged in outcomes
    pub id: T,
    pub address: StorageAddress,
    pub destination: PathBuf,
}

/// A request that was restored, with enough provenance for backfill
#[derive(Debug, Clone)]
pub struct RestoredEntry<T> {
    pub request: RestoreRequest<T>,
    /// Name of the storage that served the hit
    pub storage_name: String,
    /// Policy indices consulted before the hit that reported a miss
    missed_policies: Vec<usize>,
}

/// Result of walking the consumer chain for a batch of requests
#[derive(Debug)]
pub struct RestoreOutcome<T> {
    pub restored: Vec<RestoredEntry<T>>,
    /// Requests no consumer storage could serve
    pub remaining: Vec<RestoreRequest<T>>,
}

/// One entry to write back: the materialized artifact and its address
#[derive(Debug, Clone)]
pub struct StoreRequest<T> {
    pub id: T,
    pub address: StorageAddress,
    pub artifact: PathBuf,
}

/// Which producer storages accepted one entry
#[derive(Debug)]
pub struct StoreOutcome<T> {
    pub id: T,
    pub produced_to: Vec<String>,
}

/// What one worker observed for one entry on one storage
enum Probe {
    Hit,
    Miss,
}

/// Priority-ordered cache chain with bounded parallel fan-out
pub struct TieredCache {
    policies: Vec<CachePolicy>,
    default_parallelism: usize,
}

impl TieredCache {
    pub fn new(policies: Vec<CachePolicy>, default_parallelism: usize) -> Self {
        Self {
            policies,
            default_parallelism: default_parallelism.max(1),
        }
    }

    /// Fan-out width for one storage: its preference, else the default
    fn width_for(&self, storage: &dyn CacheStorage) -> usize {
        storage
            .preferred_parallelism()
            .unwrap_or(self.default_parallelism)
            .max(1)
    }

    /// Walk consumer policies in priority order, restoring what each can
    /// serve and carrying the rest to the next storage.
    pub async fn restore<T>(&self, requests: Vec<RestoreRequest<T>>) -> RestoreOutcome<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        struct Pending<T> {
            request: RestoreRequest<T>,
            missed: Vec<usize>,
        }

        let mut remaining: Vec<Pending<T>> = requests
            .into_iter()
            .map(|request| Pending {
                request,
                missed: Vec::new(),
            })
            .collect();
        let mut restored = Vec::new();

        for (policy_index, policy) in self.policies.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            if !policy.roles.can_consume() {
                continue;
            }

            let storage = Arc::clone(&policy.storage);
            let width = self.width_for(storage.as_ref());
            debug!(
                "restore: consulting '{}' for {} entries (width {})",
                storage.name(),
                remaining.len(),
                width
            );

            let pairs = remaining
                .iter()
                .map(|p| (p.request.address.clone(), p.request.destination.clone()))
                .collect();
            let hits = probe_batch(&storage, pairs, width).await;

            // Stage barrier: all workers joined, now merge the results.
            let mut still_pending = Vec::with_capacity(remaining.len());
            for (mut pending, hit) in remaining.into_iter().zip(hits) {
                if hit {
                    restored.push(RestoredEntry {
                        request: pending.request,
                        storage_name: storage.name().to_string(),
                        missed_policies: pending.missed.clone(),
                    });
                } else {
                    pending.missed.push(policy_index);
                    still_pending.push(pending);
                }
            }
            remaining = still_pending;
        }

        RestoreOutcome {
            restored,
            remaining: remaining.into_iter().map(|p| p.request).collect(),
        }
    }

    /// Propagate restored entries to producer-capable storages earlier in
    /// the chain that missed during restore.
    ///
    /// Best-effort: a backfill failure just means that storage misses again
    /// next pass. Returns the storages successfully updated per entry.
    pub async fn backfill<T>(&self, restored: &[RestoredEntry<T>]) -> Vec<StoreOutcome<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut outcomes: Vec<StoreOutcome<T>> = restored
            .iter()
            .map(|entry| StoreOutcome {
                id: entry.request.id.clone(),
                produced_to: Vec::new(),
            })
            .collect();

        for (policy_index, policy) in self.policies.iter().enumerate() {
            if !policy.roles.can_produce() {
                continue;
            }

            // Entries that consulted this storage during restore and missed.
            let wanted: Vec<usize> = restored
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.missed_policies.contains(&policy_index))
                .map(|(i, _)| i)
                .collect();
            if wanted.is_empty() {
                continue;
            }

            let storage = Arc::clone(&policy.storage);
            debug!(
                "backfill: updating '{}' with {} entries",
                storage.name(),
                wanted.len()
            );

            let stored = store_entries(
                &storage,
                wanted
                    .iter()
                    .map(|&i| {
                        (
                            restored[i].request.address.clone(),
                            restored[i].request.destination.clone(),
                        )
                    })
                    .collect(),
                self.width_for(storage.as_ref()),
            )
            .await;

            for (&entry_index, ok) in wanted.iter().zip(stored) {
                if ok {
                    outcomes[entry_index]
                        .produced_to
                        .push(storage.name().to_string());
                }
            }
        }

        outcomes
    }

    /// Write entries to every producer storage, independently per storage.
    ///
    /// Individual failures are logged and skipped; the outcome records which
    /// storages actually accepted each entry.
    pub async fn store<T>(&self, requests: Vec<StoreRequest<T>>) -> Vec<StoreOutcome<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut outcomes: Vec<StoreOutcome<T>> = requests
            .iter()
            .map(|request| StoreOutcome {
                id: request.id.clone(),
                produced_to: Vec::new(),
            })
            .collect();

        // Producer storages are independent of each other; each gets the
        // whole batch, all of them in parallel.
        let per_storage = join_all(
            self.policies
                .iter()
                .filter(|policy| policy.roles.can_produce())
                .map(|policy| {
                    let storage = Arc::clone(&policy.storage);
                    let pairs: Vec<(StorageAddress, PathBuf)> = requests
                        .iter()
                        .map(|r| (r.address.clone(), r.artifact.clone()))
                        .collect();
                    let width = self.width_for(storage.as_ref());
                    async move {
                        debug!(
                            "write-back: storing {} entries to '{}'",
                            pairs.len(),
                            storage.name()
                        );
                        let stored = store_entries(&storage, pairs, width).await;
                        (storage, stored)
                    }
                }),
        )
        .await;

        for (storage, stored) in per_storage {
            for (outcome, ok) in outcomes.iter_mut().zip(stored) {
                if ok {
                    outcome.produced_to.push(storage.name().to_string());
                }
            }
        }

        outcomes
    }
}

/// Existence-check and fetch `(address, destination)` pairs on one storage.
///
/// Returns one hit flag per pair, in input order. Fan-out is a windowed
/// `JoinSet`: fill to `width`, join one, refill, then drain. A check or
/// fetch error is logged and reported as a miss for this storage only.
async fn probe_batch(
    storage: &Arc<dyn CacheStorage>,
    pairs: Vec<(StorageAddress, PathBuf)>,
    width: usize,
) -> Vec<bool> {
    let mut hits = vec![false; pairs.len()];
    let mut join_set: JoinSet<(usize, StrataResult<Probe>)> = JoinSet::new();
    let mut pairs = pairs.into_iter().enumerate();

    loop {
        while join_set.len() < width {
            let Some((index, (address, destination))) = pairs.next() else {
                break;
            };
            let storage = Arc::clone(storage);
            join_set.spawn(async move {
                let result = async {
                    if storage.exists_valid_cache(&address).await? {
                        storage.fetch_artifacts(&address, &destination).await?;
                        Ok(Probe::Hit)
                    } else {
                        Ok(Probe::Miss)
                    }
                }
                .await;
                (index, result)
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        match joined {
            Ok((index, Ok(Probe::Hit))) => hits[index] = true,
            Ok((_, Ok(Probe::Miss))) => {}
            Ok((_, Err(e))) => {
                warn!("storage '{}' failed during restore: {}", storage.name(), e);
            }
            Err(e) => {
                warn!("restore worker panicked: {}", e);
            }
        }
    }

    hits
}

/// Store `(address, artifact)` pairs on one storage with bounded fan-out.
///
/// Returns one success flag per pair, in input order; failures are warnings.
async fn store_entries(
    storage: &Arc<dyn CacheStorage>,
    pairs: Vec<(StorageAddress, PathBuf)>,
    width: usize,
) -> Vec<bool> {
    let mut stored = vec![false; pairs.len()];
    let mut join_set: JoinSet<(usize, StrataResult<()>)> = JoinSet::new();
    let mut pairs = pairs.into_iter().enumerate();

    loop {
        while join_set.len() < width {
            let Some((index, (address, artifact))) = pairs.next() else {
                break;
            };
            let storage = Arc::clone(storage);
            join_set
                .spawn(async move { (index, storage.cache_artifact(&artifact, &address).await) });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        match joined {
            Ok((index, Ok(()))) => stored[index] = true,
            Ok((_, Err(e))) => {
                warn!("storage '{}' rejected a write: {}", storage.name(), e);
            }
            Err(e) => {
                warn!("store worker panicked: {}", e);
            }
        }
    }

    stored
}
