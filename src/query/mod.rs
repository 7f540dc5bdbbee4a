//! Lazy, cancellable, paginated queries over one or many package sources.
//!
//! A [`QueryContinuation`] produces one batch of results plus, if more may
//! exist, the continuation for the next batch. Continuations are immutable:
//! advancing one returns a new one rather than mutating state, so the same
//! continuation always fetches the same batch.
//!
//! - [`AggregateQuery`] fans one advance out to several continuations and
//!   reduces their batches into one.
//! - [`SearchQuery`] and [`UpdateQuery`] are the leaves talking to sources.
//!   Given a [`CaughtErrors`] sink they record a source failure there and
//!   skip the failed part instead of failing the whole advance.
//! - [`PackagePager`] turns a continuation into stable, numbered pages backed
//!   by a [`SortedPackageIndex`].

mod aggregate;
mod index;
mod pager;
mod search;
mod update;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PackageError;

pub use aggregate::AggregateQuery;
pub use index::{SortOrder, SortedPackageIndex};
pub use pager::PackagePager;
pub use search::SearchQuery;
pub use update::UpdateQuery;

/// Shared handle to a continuation.
pub type Continuation<T> = Arc<dyn QueryContinuation<T>>;

/// One advance: a batch of results and the continuation for the next batch,
/// `None` once the query is exhausted.
pub struct QueryStep<T> {
    pub result: T,
    pub next: Option<Continuation<T>>,
}

impl<T> QueryStep<T> {
    pub fn last(result: T) -> Self {
        Self { result, next: None }
    }

    pub fn more(result: T, next: Continuation<T>) -> Self {
        Self {
            result,
            next: Some(next),
        }
    }
}

#[async_trait]
pub trait QueryContinuation<T>: Send + Sync {
    async fn get_result(&self, cancel: &CancellationToken) -> Result<QueryStep<T>, PackageError>;
}

/// A precomputed result with nothing after it.
pub struct ResultOnly<T> {
    result: T,
}

impl<T> ResultOnly<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> QueryContinuation<T> for ResultOnly<T> {
    async fn get_result(&self, _cancel: &CancellationToken) -> Result<QueryStep<T>, PackageError> {
        Ok(QueryStep::last(self.result.clone()))
    }
}

/// Collects source failures that leaves caught instead of failing an advance.
///
/// A leaf built with a sink records its failure here and ends its own branch,
/// so the other branches of an aggregate keep paging. Clones share one list.
#[derive(Debug, Clone, Default)]
pub struct CaughtErrors {
    errors: Arc<Mutex<Vec<PackageError>>>,
}

impl CaughtErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: PackageError) {
        self.lock().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every failure recorded so far, in arrival order.
    pub fn errors(&self) -> Vec<PackageError> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PackageError>> {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
