use std::collections::{HashMap, VecDeque};

use log::debug;
use semver::Version;
use tokio_util::sync::CancellationToken;

use super::{DependencyBehavior, DependencyPool};
use crate::error::{PackageError, check_cancelled};
use crate::package::{
    DependencyRange, LocalPackageStore, PackageDependencyInfo, PackageId, PackageIdentity,
    VersionRange,
};
use crate::runtime::Runtime;
use crate::source::{SourceRegistry, TargetFramework};

/// Collects the dependency records a resolution pass needs.
///
/// Installed packages are read from the local store; everything else comes
/// from the source registry. Every identity is looked up at most once per
/// pass, which also stops dependency cycles from looping.
pub struct DependencyGatherer<'a, R: Runtime> {
    store: &'a LocalPackageStore<R>,
    sources: &'a SourceRegistry,
    framework: TargetFramework,
    behavior: DependencyBehavior,
}

impl<'a, R: Runtime> DependencyGatherer<'a, R> {
    pub fn new(
        store: &'a LocalPackageStore<R>,
        sources: &'a SourceRegistry,
        framework: TargetFramework,
        behavior: DependencyBehavior,
    ) -> Self {
        Self {
            store,
            sources,
            framework,
            behavior,
        }
    }

    pub async fn gather(
        &self,
        target: &PackageIdentity,
        cancel: &CancellationToken,
    ) -> Result<DependencyPool, PackageError> {
        let mut pool = DependencyPool::new();
        let mut versions: HashMap<PackageId, Vec<Version>> = HashMap::new();
        let mut ranges: HashMap<PackageId, Vec<VersionRange>> = HashMap::new();
        let mut queue = VecDeque::from([target.clone()]);

        while let Some(identity) = queue.pop_front() {
            if pool.contains_key(&identity) {
                continue;
            }
            check_cancelled(cancel)?;

            let info = self.lookup(&identity).await?.ok_or_else(|| PackageError::NotFound {
                id: identity.id.to_string(),
                range: Some(VersionRange::exact(identity.version.clone())),
            })?;

            if self.behavior != DependencyBehavior::Ignore {
                for dependency in &info.dependencies {
                    check_cancelled(cancel)?;
                    let seen = ranges.entry(dependency.id.clone()).or_default();
                    seen.push(dependency.range.clone());
                    let seen = seen.clone();
                    for candidate in self
                        .candidates(dependency, &seen, &mut versions)
                        .await?
                    {
                        if !pool.contains_key(&candidate) {
                            queue.push_back(candidate);
                        }
                    }
                }
            }

            debug!(
                "Gathered {} from {} ({} dependencies)",
                identity,
                info.source,
                info.dependencies.len()
            );
            pool.insert(identity, info);
        }

        Ok(pool)
    }

    async fn lookup(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<PackageDependencyInfo>, PackageError> {
        if let Some(info) = self
            .store
            .dependency_info(identity, self.framework.as_deref())?
        {
            return Ok(Some(info));
        }
        self.sources
            .find_dependency_info(identity, &self.framework)
            .await
    }

    /// Candidate versions for one dependency edge.
    ///
    /// Installed versions satisfying the range are always candidates. From the
    /// sources, the policy pick among versions satisfying every range seen for
    /// the id so far is preferred, falling back to the pick for this range.
    async fn candidates(
        &self,
        dependency: &DependencyRange,
        seen: &[VersionRange],
        versions: &mut HashMap<PackageId, Vec<Version>>,
    ) -> Result<Vec<PackageIdentity>, PackageError> {
        let mut found: Vec<PackageIdentity> = self
            .store
            .installed_versions(&dependency.id)?
            .into_iter()
            .filter(|i| dependency.range.satisfies(&i.version))
            .collect();

        if !versions.contains_key(&dependency.id) {
            let available = self.sources.find_versions(&dependency.id).await?;
            versions.insert(dependency.id.clone(), available);
        }
        let available = versions.get(&dependency.id).map(Vec::as_slice).unwrap_or(&[]);

        let all_ranges = available
            .iter()
            .filter(|v| seen.iter().all(|r| r.satisfies(v)));
        let pick = self
            .pick(&dependency.range, all_ranges)
            .or_else(|| self.pick(&dependency.range, available));
        if let Some(version) = pick {
            let identity = PackageIdentity::new(dependency.id.clone(), version.clone());
            if !found.contains(&identity) {
                found.push(identity);
            }
        }

        if found.is_empty() {
            return Err(PackageError::NotFound {
                id: dependency.id.to_string(),
                range: Some(dependency.range.clone()),
            });
        }
        Ok(found)
    }

    fn pick<'v>(
        &self,
        range: &VersionRange,
        candidates: impl IntoIterator<Item = &'v Version>,
    ) -> Option<&'v Version> {
        match self.behavior {
            DependencyBehavior::Lowest => range.find_lowest(candidates),
            _ => range.find_highest(candidates),
        }
    }
}
