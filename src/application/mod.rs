//! Application layer - Use cases that coordinate domain services.
//!
//! This layer contains the application-specific business rules and orchestrates
//! the flow of data between the CLI layer and the resolver, planner, store and
//! package sources.

mod install;
mod uninstall;

pub use install::{InstallOptions, InstallOutcome, InstallReport, InstallUseCase};
pub use uninstall::{UninstallOptions, UninstallReport, UninstallUseCase};

use crate::package::PackageIdentity;

/// A package a plugin vetoed, with the vetoing plugin's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPackage {
    pub identity: PackageIdentity,
    pub plugin: String,
}
