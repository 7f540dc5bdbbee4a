use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{Continuation, QueryContinuation, QueryStep};
use crate::error::{PackageError, check_cancelled};

/// Combines the batches of one advance into a single result.
pub type Reducer<T> = Arc<dyn Fn(Vec<T>) -> T + Send + Sync>;

/// Fans one advance out to every branch and reduces the batches.
///
/// All branches of a round complete before the round's result is built, so
/// batches from different rounds never mix. Any branch failure fails the
/// whole advance. Exhausted branches are dropped; once none remain the
/// aggregate is exhausted too.
pub struct AggregateQuery<T> {
    branches: Vec<Continuation<T>>,
    reduce: Reducer<T>,
}

impl<T: Send + 'static> AggregateQuery<T> {
    pub fn new(branches: Vec<Continuation<T>>, reduce: Reducer<T>) -> Self {
        Self { branches, reduce }
    }
}

impl<E: Send + 'static> AggregateQuery<Vec<E>> {
    /// Aggregate that concatenates branch batches in branch order.
    pub fn concat(branches: Vec<Continuation<Vec<E>>>) -> Self {
        Self::new(
            branches,
            Arc::new(|batches: Vec<Vec<E>>| batches.into_iter().flatten().collect()),
        )
    }
}

#[async_trait]
impl<T: Send + 'static> QueryContinuation<T> for AggregateQuery<T> {
    async fn get_result(&self, cancel: &CancellationToken) -> Result<QueryStep<T>, PackageError> {
        check_cancelled(cancel)?;

        let steps = join_all(self.branches.iter().map(|branch| branch.get_result(cancel))).await;
        let steps = steps.into_iter().collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(steps.len());
        let mut remaining = Vec::new();
        for step in steps {
            results.push(step.result);
            remaining.extend(step.next);
        }
        debug!(
            "Aggregate advance: {} branch(es), {} remaining",
            results.len(),
            remaining.len()
        );

        let result = (self.reduce)(results);
        if remaining.is_empty() {
            return Ok(QueryStep::last(result));
        }
        Ok(QueryStep::more(
            result,
            Arc::new(AggregateQuery {
                branches: remaining,
                reduce: self.reduce.clone(),
            }),
        ))
    }
}
