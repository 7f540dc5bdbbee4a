use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::{CaughtErrors, QueryContinuation, QueryStep};
use crate::error::{PackageError, check_cancelled};
use crate::package::{PackageId, PackageIdentity, PackageMetadata};
use crate::source::SourceRegistry;

/// Pages through the installed packages, yielding newer versions the
/// sources offer.
#[derive(Clone)]
pub struct UpdateQuery {
    sources: Arc<SourceRegistry>,
    /// Highest installed version per id, ordered by id
    installed: Arc<Vec<PackageIdentity>>,
    offset: usize,
    take: usize,
    include_prerelease: bool,
    caught: Option<CaughtErrors>,
}

impl UpdateQuery {
    pub fn new(sources: Arc<SourceRegistry>, installed: Vec<PackageIdentity>, take: usize) -> Self {
        let mut highest: BTreeMap<PackageId, PackageIdentity> = BTreeMap::new();
        for identity in installed {
            match highest.get(&identity.id) {
                Some(existing) if existing.version >= identity.version => {}
                _ => {
                    highest.insert(identity.id.clone(), identity);
                }
            }
        }
        Self {
            sources,
            installed: Arc::new(highest.into_values().collect()),
            offset: 0,
            take: take.max(1),
            include_prerelease: false,
            caught: None,
        }
    }

    pub fn include_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }

    /// Record a failed update check in `sink` and move on to the next
    /// installed package, instead of failing the advance.
    pub fn catch_errors(mut self, sink: CaughtErrors) -> Self {
        self.caught = Some(sink);
        self
    }

    async fn newer_version(
        &self,
        installed: &PackageIdentity,
    ) -> Result<Option<PackageMetadata>, PackageError> {
        let latest = match self
            .sources
            .latest_version(&installed.id, self.include_prerelease)
            .await
        {
            Ok(latest) => latest,
            Err(PackageError::NotFound { .. }) => {
                debug!("{} is not offered by any source", installed.id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if latest <= installed.version {
            return Ok(None);
        }
        let identity = PackageIdentity::new(installed.id.clone(), latest);
        self.sources.get_metadata(&identity, None).await.map(Some)
    }
}

#[async_trait]
impl QueryContinuation<Vec<PackageMetadata>> for UpdateQuery {
    async fn get_result(
        &self,
        cancel: &CancellationToken,
    ) -> Result<QueryStep<Vec<PackageMetadata>>, PackageError> {
        let end = (self.offset + self.take).min(self.installed.len());
        let mut updates = Vec::new();
        for installed in &self.installed[self.offset.min(end)..end] {
            check_cancelled(cancel)?;
            match (self.newer_version(installed).await, &self.caught) {
                (Ok(Some(meta)), _) => updates.push(meta),
                (Ok(None), _) => {}
                (Err(e), Some(sink)) => {
                    warn!("Update check failed for {}: {}", installed, e);
                    sink.push(e);
                }
                (Err(e), None) => return Err(e),
            }
        }

        if end >= self.installed.len() {
            return Ok(QueryStep::last(updates));
        }
        let mut next = self.clone();
        next.offset = end;
        Ok(QueryStep::more(updates, Arc::new(next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::runtime::RealRuntime;
    use crate::source::{FolderSource, MockPackageSource};
    use crate::test_utils::write_feed_package;
    use semver::Version;
    use tempfile::tempdir;

    fn identity(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_yields_newer_versions_in_chunks() {
        let feed = tempdir().unwrap();
        write_feed_package(feed.path(), "A", "2.0.0", &[], false);
        write_feed_package(feed.path(), "B", "1.0.0", &[], false);
        write_feed_package(feed.path(), "C", "1.5.0", &[], false);
        let mut sources = SourceRegistry::new();
        sources.register(Arc::new(FolderSource::new(Arc::new(RealRuntime), feed.path())));

        let installed = vec![
            identity("A@1.0.0"),
            identity("B@1.0.0"),
            identity("C@1.0.0"),
            identity("C@0.5.0"),
            identity("Local.Only@1.0.0"),
        ];
        let cancel = CancellationToken::new();
        let query = UpdateQuery::new(Arc::new(sources), installed, 2);

        let first = query.get_result(&cancel).await.unwrap();
        let shown: Vec<String> = first.result.iter().map(|m| m.identity().to_string()).collect();
        assert_eq!(shown, vec!["A@2.0.0"]);

        let second = first.next.unwrap().get_result(&cancel).await.unwrap();
        let shown: Vec<String> = second.result.iter().map(|m| m.identity().to_string()).collect();
        assert_eq!(shown, vec!["C@1.5.0"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_caught_failure_skips_only_that_package() {
        let mut broken = MockPackageSource::new();
        broken.expect_name().return_const("broken".to_string());
        broken.expect_find_versions().returning(|id| {
            if id.as_str() == "A" {
                Err(anyhow::anyhow!("invalid response"))
            } else {
                Ok(vec![Version::new(2, 0, 0)])
            }
        });
        broken.expect_get_metadata().returning(|identity| {
            Ok(Some(PackageMetadata::new(
                identity.id.clone(),
                identity.version.clone(),
            )))
        });
        let mut sources = SourceRegistry::new().with_retry(RetryPolicy::none());
        sources.register(Arc::new(broken));

        let sink = CaughtErrors::new();
        let query = UpdateQuery::new(
            Arc::new(sources),
            vec![identity("A@1.0.0"), identity("B@1.0.0")],
            10,
        )
        .catch_errors(sink.clone());
        let step = query.get_result(&CancellationToken::new()).await.unwrap();

        let shown: Vec<String> = step.result.iter().map(|m| m.identity().to_string()).collect();
        assert_eq!(shown, vec!["B@2.0.0"]);
        assert!(step.next.is_none());
        assert_eq!(sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_uncaught_failure_fails_advance() {
        let mut broken = MockPackageSource::new();
        broken.expect_name().return_const("broken".to_string());
        broken
            .expect_find_versions()
            .returning(|_| Err(anyhow::anyhow!("invalid response")));
        let mut sources = SourceRegistry::new().with_retry(RetryPolicy::none());
        sources.register(Arc::new(broken));

        let query = UpdateQuery::new(Arc::new(sources), vec![identity("A@1.0.0")], 10);
        let err = query.get_result(&CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, PackageError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_nothing_installed() {
        let query = UpdateQuery::new(Arc::new(SourceRegistry::new()), vec![], 10);
        let step = query.get_result(&CancellationToken::new()).await.unwrap();
        assert!(step.result.is_empty());
        assert!(step.next.is_none());
    }
}
