//! Package source abstraction.
//!
//! A package source (feed) answers dependency, metadata, version, content and
//! search questions. The resolver, installer and query engine only ever talk
//! to sources through [`PackageSource`], usually via a [`SourceRegistry`].

mod folder;
mod registry;

use anyhow::Result;
use async_trait::async_trait;
use semver::Version;

use crate::package::{PackageDependencyInfo, PackageId, PackageIdentity, PackageMetadata};

pub use folder::FolderSource;
pub use registry::SourceRegistry;

/// Target framework/platform used to pick dependency groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetFramework(Option<String>);

impl TargetFramework {
    /// Matches only framework-less dependency groups.
    pub fn any() -> Self {
        Self(None)
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<Option<String>> for TargetFramework {
    fn from(value: Option<String>) -> Self {
        Self(value)
    }
}

/// Trait for package sources (local folders, remote feeds).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Name used in logs, errors and `SourceId` handles.
    fn name(&self) -> &str;

    /// Dependency record for one package version, `None` if the source lacks it.
    async fn find_dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Result<Option<PackageDependencyInfo>>;

    /// Manifest for one package version, `None` if the source lacks it.
    async fn get_metadata(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>>;

    /// Raw package content.
    async fn get_content(&self, identity: &PackageIdentity) -> Result<Vec<u8>>;

    /// All versions of `id` this source offers.
    async fn find_versions(&self, id: &PackageId) -> Result<Vec<Version>>;

    async fn exists(&self, identity: &PackageIdentity) -> Result<bool>;

    /// One page of search results, newest version per id, ordered by id.
    async fn search(&self, term: &str, skip: usize, take: usize) -> Result<Vec<PackageMetadata>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_framework() {
        assert_eq!(TargetFramework::any().as_deref(), None);
        assert_eq!(TargetFramework::new("net8").as_deref(), Some("net8"));
        assert_eq!(
            TargetFramework::from(Some("net8".to_string())),
            TargetFramework::new("net8")
        );
        assert_eq!(TargetFramework::default(), TargetFramework::any());
    }
}
