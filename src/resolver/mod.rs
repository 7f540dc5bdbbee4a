//! Dependency resolution.
//!
//! Resolution runs in two phases:
//!
//! - [`DependencyGatherer`] walks the dependency graph through the local store
//!   and the package sources, building a pool of dependency records. This is
//!   the only phase that suspends.
//! - [`resolve`] picks one version per id from that pool and orders the
//!   result so dependencies come before their dependents. It is pure.

mod gather;
mod solve;

use std::collections::BTreeMap;

use crate::package::{PackageDependencyInfo, PackageIdentity};

pub use gather::DependencyGatherer;
pub use solve::resolve;

/// Dependency records gathered for one resolution pass, keyed by identity.
pub type DependencyPool = BTreeMap<PackageIdentity, PackageDependencyInfo>;

/// Version selection policy for dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyBehavior {
    /// Newest version satisfying every range.
    #[default]
    Highest,
    /// Oldest version satisfying every range.
    Lowest,
    /// Install only the target.
    Ignore,
}
