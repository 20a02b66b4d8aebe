//! Cache targets
//!
//! A cache target is the addressable unit the orchestrator reasons about:
//! a build product (package + unit) plus the options it is built with. The
//! same unit under different options is a different target, which is what
//! makes per-unit option overrides and option matrices work.

use crate::key::BuildOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a buildable unit inside a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildProduct {
    /// Package the unit belongs to
    pub package: String,
    /// Unit name within the package
    pub unit: String,
}

impl BuildProduct {
    pub fn new(package: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            unit: unit.into(),
        }
    }
}

impl fmt::Display for BuildProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.unit)
    }
}

/// One addressable unit of cache orchestration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheTarget {
    pub product: BuildProduct,
    pub options: BuildOptions,
}

impl CacheTarget {
    pub fn new(product: BuildProduct, options: BuildOptions) -> Self {
        Self { product, options }
    }
}

impl fmt::Display for CacheTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.product, self.options.configuration)
    }
}
