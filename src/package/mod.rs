//! Package value types.
//!
//! Identities, version ranges and manifests. Everything here is pure data
//! with no I/O beyond loading a manifest through the runtime, plus the
//! local store that records what is installed.

mod identity;
mod meta;
mod store;
mod version;

pub use identity::{PackageId, PackageIdentity, PackageSpec};
pub use meta::{DependencyGroup, PackageDependencyInfo, PackageMetadata, SourceId};
pub use store::{InstalledPackage, LocalPackageStore};
pub use version::{DependencyRange, VersionRange, parse_version};
