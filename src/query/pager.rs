use std::collections::HashSet;

use log::debug;
use tokio_util::sync::CancellationToken;

use super::{Continuation, SortOrder, SortedPackageIndex};
use crate::error::PackageError;
use crate::package::{PackageId, PackageMetadata};

/// Stable numbered pages over a package query.
///
/// Pages are built in order and cached: page `k` is only built after pages
/// `0..k`, and reading a built page again never fetches. Records merged into
/// the index after a package was shown on an earlier page do not show it
/// again.
pub struct PackagePager {
    next: Option<Continuation<Vec<PackageMetadata>>>,
    index: SortedPackageIndex,
    page_size: usize,
    pages: Vec<Vec<PackageMetadata>>,
    emitted: HashSet<PackageId>,
}

impl PackagePager {
    pub fn new(
        query: Continuation<Vec<PackageMetadata>>,
        order: SortOrder,
        page_size: usize,
    ) -> Self {
        Self {
            next: Some(query),
            index: SortedPackageIndex::new(order),
            page_size: page_size.max(1),
            pages: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    /// Whether page `page_index` is already built.
    pub fn has_query_page(&self, page_index: usize) -> bool {
        page_index < self.pages.len()
    }

    /// Whether the query is exhausted and every result has been paged.
    pub fn is_completed(&self) -> bool {
        self.next.is_none() && self.pending() == 0
    }

    /// Page `page_index`, building it and any earlier pages first.
    ///
    /// Returns an empty page past the end of the results.
    pub async fn get_page(
        &mut self,
        page_index: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageMetadata>, PackageError> {
        while self.pages.len() <= page_index {
            if !self.build_page(cancel).await? {
                return Ok(vec![]);
            }
        }
        Ok(self.pages[page_index].clone())
    }

    /// Fetch until a full page is available or the query is exhausted, then
    /// cut the next page. Returns `false` if there was nothing left to page.
    async fn build_page(&mut self, cancel: &CancellationToken) -> Result<bool, PackageError> {
        while self.pending() < self.page_size {
            let Some(query) = self.next.take() else {
                break;
            };
            let step = match query.get_result(cancel).await {
                Ok(step) => step,
                Err(e) => {
                    // Keep the failed continuation so a retry refetches the same batch.
                    self.next = Some(query);
                    return Err(e);
                }
            };
            let added = self.index.add_range(step.result);
            debug!("Merged {} new record(s) into the package index", added);
            self.next = step.next;
        }

        let page: Vec<PackageMetadata> = self
            .index
            .sorted()
            .into_iter()
            .filter(|meta| !self.emitted.contains(&meta.id))
            .take(self.page_size)
            .cloned()
            .collect();
        if page.is_empty() {
            return Ok(false);
        }
        self.emitted.extend(page.iter().map(|meta| meta.id.clone()));
        self.pages.push(page);
        Ok(true)
    }

    /// Indexed records not shown on any page yet.
    fn pending(&self) -> usize {
        self.index.len() - self.emitted.len()
    }
}
