use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::{CaughtErrors, QueryContinuation, QueryStep};
use crate::error::{PackageError, check_cancelled};
use crate::package::PackageMetadata;
use crate::retry::{RetryPolicy, with_retry};
use crate::source::PackageSource;

/// Pages through one source's search results.
#[derive(Clone)]
pub struct SearchQuery {
    source: Arc<dyn PackageSource>,
    term: String,
    skip: usize,
    take: usize,
    caught: Option<CaughtErrors>,
    retry: RetryPolicy,
}

impl SearchQuery {
    pub fn new(source: Arc<dyn PackageSource>, term: impl Into<String>, take: usize) -> Self {
        Self {
            source,
            term: term.into(),
            skip: 0,
            take: take.max(1),
            caught: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Record a source failure in `sink` and end this branch with an empty
    /// batch, instead of failing the advance.
    pub fn catch_errors(mut self, sink: CaughtErrors) -> Self {
        self.caught = Some(sink);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch(&self) -> Result<Vec<PackageMetadata>, PackageError> {
        with_retry(self.retry, "search", || async {
            self.source
                .search(&self.term, self.skip, self.take)
                .await
                .map_err(|e| PackageError::SourceUnavailable {
                    feed: self.source.name().to_string(),
                    message: format!("{:#}", e),
                })
        })
        .await
    }
}

#[async_trait]
impl QueryContinuation<Vec<PackageMetadata>> for SearchQuery {
    async fn get_result(
        &self,
        cancel: &CancellationToken,
    ) -> Result<QueryStep<Vec<PackageMetadata>>, PackageError> {
        check_cancelled(cancel)?;

        let page = match (self.fetch().await, &self.caught) {
            (Ok(page), _) => page,
            (Err(e), Some(sink)) => {
                warn!("Search failed on {}: {}", self.source.name(), e);
                sink.push(e);
                return Ok(QueryStep::last(vec![]));
            }
            (Err(e), None) => return Err(e),
        };
        debug!(
            "{} returned {} result(s) at offset {}",
            self.source.name(),
            page.len(),
            self.skip
        );

        // A short page is the last one.
        if page.len() < self.take {
            return Ok(QueryStep::last(page));
        }
        let mut next = self.clone();
        next.skip += self.take;
        Ok(QueryStep::more(page, Arc::new(next)))
    }
}
