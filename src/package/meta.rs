use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{DependencyRange, PackageId, PackageIdentity};
use crate::runtime::Runtime;

/// Dependencies declared for one target framework (or for any framework).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DependencyGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRange>,
}

/// Package manifest as published by a feed and stored with installed packages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    pub id: PackageId,
    #[serde(deserialize_with = "super::version::deserialize_version")]
    pub version: Version,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub requires_license_acceptance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageMetadata {
    pub fn new(id: impl Into<PackageId>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            title: None,
            description: None,
            authors: vec![],
            download_count: 0,
            requires_license_acceptance: false,
            license_url: None,
            dependency_groups: vec![],
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// Display title, falling back to the id.
    pub fn display_title(&self) -> &str {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => self.id.as_str(),
        }
    }

    /// Dependencies for `framework`.
    ///
    /// An exact framework match wins; otherwise the framework-less group is used.
    pub fn dependencies_for(&self, framework: Option<&str>) -> Vec<DependencyRange> {
        if let Some(fw) = framework
            && let Some(group) = self.dependency_groups.iter().find(|g| {
                g.framework
                    .as_deref()
                    .is_some_and(|f| f.eq_ignore_ascii_case(fw))
            })
        {
            return group.dependencies.clone();
        }
        self.dependency_groups
            .iter()
            .find(|g| g.framework.is_none())
            .map(|g| g.dependencies.clone())
            .unwrap_or_default()
    }

    /// Case-insensitive match against id, title and description.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.id.key().contains(&term)
            || self
                .title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&term))
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }

    #[tracing::instrument(skip(runtime, path))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let meta: PackageMetadata = serde_json::from_str(&content)
            .with_context(|| format!("Invalid package manifest {:?}", path))?;
        Ok(meta)
    }
}

/// Opaque handle naming the package source a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The handle used for records read from the local install state.
    pub fn local() -> Self {
        Self("local".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dependency record for one package version, as returned by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDependencyInfo {
    pub identity: PackageIdentity,
    pub source: SourceId,
    pub dependencies: Vec<DependencyRange>,
}

impl PackageDependencyInfo {
    pub fn new(
        identity: PackageIdentity,
        source: SourceId,
        dependencies: Vec<DependencyRange>,
    ) -> Self {
        Self {
            identity,
            source,
            dependencies,
        }
    }

    pub fn from_metadata(meta: &PackageMetadata, source: SourceId, framework: Option<&str>) -> Self {
        Self::new(meta.identity(), source, meta.dependencies_for(framework))
    }
}
