use std::sync::Arc;

use anyhow::Result;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    error::PackageError,
    package::PackageMetadata,
    query::{AggregateQuery, CaughtErrors, Continuation, PackagePager, SearchQuery, SortOrder},
    runtime::Runtime,
    source::SourceRegistry,
};

use super::config::Config;
use super::services::Services;

/// One page of merged search results.
#[derive(Debug)]
pub(crate) struct SearchPage {
    pub results: Vec<PackageMetadata>,
    pub more: bool,
    /// Feeds that failed while the page was built.
    pub errors: Vec<PackageError>,
}

/// Search every configured feed and print one page of results
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn search<R: Runtime + 'static>(
    runtime: R,
    term: &str,
    page: usize,
    page_size: usize,
    order: SortOrder,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let services = Services::build(Arc::new(runtime), &config);
    // Pages are numbered from 1 on the command line.
    let index = page.saturating_sub(1);
    let found = search_page(&services.sources, term, index, page_size, order, &cancel).await?;

    for error in &found.errors {
        eprintln!("Warning: {}", error);
    }
    if found.results.is_empty() {
        println!("No packages found.");
        return Ok(());
    }
    for meta in &found.results {
        match &meta.description {
            Some(description) => println!("{} {}  {}", meta.id, meta.version, description),
            None => println!("{} {}", meta.id, meta.version),
        }
    }
    if found.more {
        println!("More results: --page {}", index + 2);
    }
    Ok(())
}

/// Page `index` (from 0) of the merged results of every source.
///
/// A failing source ends its own branch and is reported in
/// [`SearchPage::errors`]; the other sources keep paging.
pub(crate) async fn search_page(
    sources: &SourceRegistry,
    term: &str,
    index: usize,
    page_size: usize,
    order: SortOrder,
    cancel: &CancellationToken,
) -> Result<SearchPage, PackageError> {
    let caught = CaughtErrors::new();
    let leaves: Vec<Continuation<Vec<PackageMetadata>>> = sources
        .sources()
        .iter()
        .map(|source| {
            Arc::new(
                SearchQuery::new(source.clone(), term, page_size)
                    .with_retry(sources.retry())
                    .catch_errors(caught.clone()),
            ) as Continuation<Vec<PackageMetadata>>
        })
        .collect();
    debug!("Searching {} feed(s) for '{}'", leaves.len(), term);

    let mut pager = PackagePager::new(Arc::new(AggregateQuery::concat(leaves)), order, page_size);
    let results = pager.get_page(index, cancel).await?;
    Ok(SearchPage {
        results,
        more: !pager.is_completed(),
        errors: caught.errors(),
    })
}
