//! Registry of package sources.
//!
//! Sources are queried in registration order. Collaborator failures are
//! converted into [`PackageError::SourceUnavailable`] here, and transient ones
//! are retried.

use std::sync::Arc;

use log::debug;
use semver::Version;

use super::{PackageSource, TargetFramework};
use crate::error::PackageError;
use crate::package::{
    PackageDependencyInfo, PackageId, PackageIdentity, PackageMetadata, SourceId,
};
use crate::retry::{RetryPolicy, with_retry};

/// Ordered collection of package sources.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PackageSource>>,
    retry: RetryPolicy,
}

impl SourceRegistry {
    /// Create a new empty registry with the default retry policy.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Register a source.
    ///
    /// A source with the same name as an existing one replaces it in place.
    pub fn register(&mut self, source: Arc<dyn PackageSource>) {
        match self.sources.iter().position(|s| s.name() == source.name()) {
            Some(index) => self.sources[index] = source,
            None => self.sources.push(source),
        }
    }

    /// Look up a source by its handle.
    pub fn get(&self, id: &SourceId) -> Option<&Arc<dyn PackageSource>> {
        self.sources.iter().find(|s| s.name() == id.as_str())
    }

    pub fn sources(&self) -> &[Arc<dyn PackageSource>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Dependency record from the first source that has the package.
    pub async fn find_dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
    ) -> Result<Option<PackageDependencyInfo>, PackageError> {
        for source in &self.sources {
            let found = with_retry(self.retry, "find dependency info", || async {
                source
                    .find_dependency_info(identity, framework)
                    .await
                    .map_err(|e| unavailable(source.as_ref(), e))
            })
            .await?;
            if let Some(info) = found {
                debug!("Found {} in {}", identity, source.name());
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Union of versions of `id` across all sources, ascending.
    pub async fn find_versions(&self, id: &PackageId) -> Result<Vec<Version>, PackageError> {
        let mut versions = Vec::new();
        for source in &self.sources {
            let found = with_retry(self.retry, "find versions", || async {
                source
                    .find_versions(id)
                    .await
                    .map_err(|e| unavailable(source.as_ref(), e))
            })
            .await?;
            versions.extend(found);
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    /// Newest version of `id` any source offers.
    pub async fn latest_version(
        &self,
        id: &PackageId,
        include_prerelease: bool,
    ) -> Result<Version, PackageError> {
        self.find_versions(id)
            .await?
            .into_iter()
            .filter(|v| include_prerelease || v.pre.is_empty())
            .max()
            .ok_or_else(|| PackageError::not_found(id.as_str()))
    }

    /// Manifest for `identity`, asking `preferred` first.
    pub async fn get_metadata(
        &self,
        identity: &PackageIdentity,
        preferred: Option<&SourceId>,
    ) -> Result<PackageMetadata, PackageError> {
        for source in self.ordered(preferred) {
            let found = with_retry(self.retry, "get metadata", || async {
                source
                    .get_metadata(identity)
                    .await
                    .map_err(|e| unavailable(source.as_ref(), e))
            })
            .await?;
            if let Some(meta) = found {
                return Ok(meta);
            }
        }
        Err(PackageError::not_found(identity.to_string()))
    }

    /// Package content from `preferred`, or the first source that has it.
    pub async fn get_content(
        &self,
        identity: &PackageIdentity,
        preferred: Option<&SourceId>,
    ) -> Result<Vec<u8>, PackageError> {
        for source in self.ordered(preferred) {
            let exists = with_retry(self.retry, "check package", || async {
                source
                    .exists(identity)
                    .await
                    .map_err(|e| unavailable(source.as_ref(), e))
            })
            .await?;
            if !exists {
                continue;
            }
            return with_retry(self.retry, "get content", || async {
                source
                    .get_content(identity)
                    .await
                    .map_err(|e| unavailable(source.as_ref(), e))
            })
            .await;
        }
        Err(PackageError::not_found(identity.to_string()))
    }

    fn ordered(&self, preferred: Option<&SourceId>) -> Vec<&Arc<dyn PackageSource>> {
        let mut ordered: Vec<&Arc<dyn PackageSource>> = Vec::with_capacity(self.sources.len());
        if let Some(first) = preferred.and_then(|id| self.get(id)) {
            ordered.push(first);
        }
        for source in &self.sources {
            if !ordered.iter().any(|s| s.name() == source.name()) {
                ordered.push(source);
            }
        }
        ordered
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(source: &dyn PackageSource, err: anyhow::Error) -> PackageError {
    PackageError::SourceUnavailable {
        feed: source.name().to_string(),
        message: format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockPackageSource;
    use std::time::Duration;

    fn named(name: &str) -> MockPackageSource {
        let mut mock = MockPackageSource::new();
        mock.expect_name().return_const(name.to_string());
        mock
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(named("a")));
        registry.register(Arc::new(named("b")));
        registry.register(Arc::new(named("a")));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&SourceId::new("b")).is_some());
        assert!(registry.get(&SourceId::new("c")).is_none());
    }

    #[tokio::test]
    async fn test_find_dependency_info_first_hit_wins() {
        let identity: PackageIdentity = "core@1.0.0".parse().unwrap();

        let mut first = named("first");
        first
            .expect_find_dependency_info()
            .times(1)
            .returning(|_, _| Ok(None));
        let mut second = named("second");
        second.expect_find_dependency_info().times(1).returning(|id, _| {
            Ok(Some(PackageDependencyInfo::new(
                id.clone(),
                SourceId::new("second"),
                vec![],
            )))
        });
        let mut third = named("third");
        third.expect_find_dependency_info().never();

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(first));
        registry.register(Arc::new(second));
        registry.register(Arc::new(third));

        let info = registry
            .find_dependency_info(&identity, &TargetFramework::any())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.source, SourceId::new("second"));
    }

    #[tokio::test]
    async fn test_source_failure_becomes_source_unavailable() {
        let mut broken = named("broken");
        broken
            .expect_find_versions()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("invalid manifest index")));

        let mut registry = SourceRegistry::new().with_retry(fast_retry());
        registry.register(Arc::new(broken));

        let err = registry
            .find_versions(&PackageId::new("core"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PackageError::SourceUnavailable {
                feed: "broken".into(),
                message: "invalid manifest index".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut flaky = named("flaky");
        let mut calls = 0;
        flaky.expect_find_versions().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("connection reset by peer"))
            } else {
                Ok(vec![Version::new(1, 0, 0)])
            }
        });

        let mut registry = SourceRegistry::new().with_retry(fast_retry());
        registry.register(Arc::new(flaky));

        let versions = registry
            .find_versions(&PackageId::new("core"))
            .await
            .unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0)]);
    }

    #[tokio::test]
    async fn test_find_versions_union_and_latest() {
        let mut a = named("a");
        a.expect_find_versions()
            .returning(|_| Ok(vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]));
        let mut b = named("b");
        b.expect_find_versions().returning(|_| {
            Ok(vec![
                Version::new(2, 0, 0),
                Version::parse("3.0.0-beta").unwrap(),
            ])
        });

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(a));
        registry.register(Arc::new(b));

        let id = PackageId::new("core");
        let versions = registry.find_versions(&id).await.unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(
            registry.latest_version(&id, false).await.unwrap(),
            Version::new(2, 0, 0)
        );
        assert_eq!(
            registry.latest_version(&id, true).await.unwrap(),
            Version::parse("3.0.0-beta").unwrap()
        );
    }

    #[tokio::test]
    async fn test_get_content_prefers_given_source() {
        let identity: PackageIdentity = "core@1.0.0".parse().unwrap();

        let mut a = named("a");
        a.expect_exists().never();
        a.expect_get_content().never();
        let mut b = named("b");
        b.expect_exists().returning(|_| Ok(true));
        b.expect_get_content().returning(|_| Ok(b"from-b".to_vec()));

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(a));
        registry.register(Arc::new(b));

        let content = registry
            .get_content(&identity, Some(&SourceId::new("b")))
            .await
            .unwrap();
        assert_eq!(content, b"from-b");
    }

    #[tokio::test]
    async fn test_get_metadata_not_found() {
        let mut a = named("a");
        a.expect_get_metadata().returning(|_| Ok(None));
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(a));

        let identity: PackageIdentity = "ghost@1.0.0".parse().unwrap();
        let err = registry.get_metadata(&identity, None).await.unwrap_err();
        assert_eq!(err, PackageError::not_found("ghost@1.0.0"));
    }
}
