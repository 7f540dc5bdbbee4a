//! Package source backed by a local directory.
//!
//! Directory layout: every `*.json` file is a package manifest; the content
//! of `id@version` lives next to it in `<id>.<version>.pkg`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use semver::Version;

use super::{PackageSource, TargetFramework};
use crate::package::{
    PackageDependencyInfo, PackageId, PackageIdentity, PackageMetadata, SourceId,
};
use crate::runtime::Runtime;

pub struct FolderSource<R: Runtime> {
    runtime: Arc<R>,
    name: String,
    dir: PathBuf,
}

impl<R: Runtime> FolderSource<R> {
    pub fn new(runtime: Arc<R>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir.display().to_string();
        Self { runtime, name, dir }
    }

    /// Override the display name (defaults to the directory path).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Content file path for a package version.
    pub fn content_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.dir
            .join(format!("{}.{}.pkg", identity.id.key(), identity.version))
    }

    /// Load every manifest in the directory.
    ///
    /// Unreadable manifests are skipped with a warning so one broken file does
    /// not take the whole feed down.
    fn load_all(&self) -> Result<Vec<PackageMetadata>> {
        if !self.runtime.is_dir(&self.dir) {
            anyhow::bail!("Feed directory {:?} does not exist", self.dir);
        }

        let mut manifests = Vec::new();
        for path in self.runtime.read_dir(&self.dir)? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match PackageMetadata::load(self.runtime.as_ref(), &path) {
                Ok(meta) => manifests.push(meta),
                Err(e) => warn!("Skipping manifest {:?}: {:#}", path, e),
            }
        }
        debug!("Loaded {} manifest(s) from {}", manifests.len(), self.name);
        Ok(manifests)
    }

    fn find(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|m| m.id == identity.id && m.version == identity.version))
    }
}

#[async_trait]
impl<R: Runtime + 'static> PackageSource for FolderSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Result<Option<PackageDependencyInfo>> {
        Ok(self.find(identity)?.map(|meta| {
            PackageDependencyInfo::from_metadata(
                &meta,
                SourceId::new(self.name.clone()),
                framework.as_deref(),
            )
        }))
    }

    async fn get_metadata(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        self.find(identity)
    }

    async fn get_content(&self, identity: &PackageIdentity) -> Result<Vec<u8>> {
        let path = self.content_path(identity);
        self.runtime
            .read(&path)
            .with_context(|| format!("Content for {} is missing from {}", identity, self.name))
    }

    async fn find_versions(&self, id: &PackageId) -> Result<Vec<Version>> {
        let mut versions: Vec<Version> = self
            .load_all()?
            .into_iter()
            .filter(|m| &m.id == id)
            .map(|m| m.version)
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    async fn exists(&self, identity: &PackageIdentity) -> Result<bool> {
        Ok(self.find(identity)?.is_some())
    }

    async fn search(&self, term: &str, skip: usize, take: usize) -> Result<Vec<PackageMetadata>> {
        let mut latest: HashMap<PackageId, PackageMetadata> = HashMap::new();
        for meta in self.load_all()?.into_iter().filter(|m| m.matches(term)) {
            match latest.get(&meta.id) {
                Some(existing) if existing.version >= meta.version => {}
                _ => {
                    latest.insert(meta.id.clone(), meta);
                }
            }
        }

        let mut results: Vec<PackageMetadata> = latest.into_values().collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results.into_iter().skip(skip).take(take).collect())
    }
}
