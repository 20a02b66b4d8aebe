//! Cache policies
//!
//! A policy binds one storage to the roles it plays. A `Vec<CachePolicy>` is
//! priority-ordered: restore walks consumers front to back, and backfill
//! writes hits found late in the chain to producer-capable storages earlier
//! in it. The order is caller-specified and never reordered.

use crate::storage::CacheStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Roles a storage plays in the cache chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheRoles {
    /// Only written to (publish-only, e.g. a CI uploader)
    Producer,
    /// Only read from (e.g. a shared read-only cache)
    Consumer,
    /// Read from and written to
    Both,
}

impl CacheRoles {
    pub fn can_produce(&self) -> bool {
        matches!(self, Self::Producer | Self::Both)
    }

    pub fn can_consume(&self) -> bool {
        matches!(self, Self::Consumer | Self::Both)
    }
}

impl fmt::Display for CacheRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
            Self::Both => write!(f, "producer+consumer"),
        }
    }
}

/// One storage bound to its roles
#[derive(Clone)]
pub struct CachePolicy {
    pub storage: Arc<dyn CacheStorage>,
    pub roles: CacheRoles,
}

impl CachePolicy {
    pub fn new(storage: Arc<dyn CacheStorage>, roles: CacheRoles) -> Self {
        Self { storage, roles }
    }

    pub fn producer(storage: Arc<dyn CacheStorage>) -> Self {
        Self::new(storage, CacheRoles::Producer)
    }

    pub fn consumer(storage: Arc<dyn CacheStorage>) -> Self {
        Self::new(storage, CacheRoles::Consumer)
    }

    pub fn producer_and_consumer(storage: Arc<dyn CacheStorage>) -> Self {
        Self::new(storage, CacheRoles::Both)
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("storage", &self.storage.name())
            .field("roles", &self.roles)
            .finish()
    }
}
