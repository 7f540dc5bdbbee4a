use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    application::InstallOptions,
    error::PackageError,
    package::{PackageId, PackageIdentity},
    query::{CaughtErrors, PackagePager, SortOrder, UpdateQuery},
    runtime::Runtime,
};

use super::config::Config;
use super::install::install_target;
use super::services::Services;

const UPDATE_PAGE_SIZE: usize = 20;

/// List installed packages that have a newer version in a feed
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn updates<R: Runtime + 'static>(
    runtime: R,
    include_prerelease: bool,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let services = Services::build(Arc::new(runtime), &config);
    let installed = services.store.list_installed()?;

    let mut current: HashMap<PackageId, PackageIdentity> = HashMap::new();
    for identity in &installed {
        match current.get(&identity.id) {
            Some(existing) if existing.version >= identity.version => {}
            _ => {
                current.insert(identity.id.clone(), identity.clone());
            }
        }
    }

    let caught = CaughtErrors::new();
    let query = UpdateQuery::new(services.sources.clone(), installed, UPDATE_PAGE_SIZE)
        .include_prerelease(include_prerelease)
        .catch_errors(caught.clone());
    let mut pager = PackagePager::new(Arc::new(query), SortOrder::Id, UPDATE_PAGE_SIZE);

    let mut found = 0;
    let mut page_index = 0;
    loop {
        let page = pager.get_page(page_index, &cancel).await?;
        if page.is_empty() {
            break;
        }
        for meta in &page {
            match current.get(&meta.id) {
                Some(installed) => {
                    println!("{} {} -> {}", meta.id, installed.version, meta.version)
                }
                None => println!("{} {}", meta.id, meta.version),
            }
        }
        found += page.len();
        page_index += 1;
    }

    for error in caught.errors() {
        eprintln!("Warning: {}", error);
    }
    if found == 0 && caught.is_empty() {
        println!("All packages are up to date.");
    }
    Ok(())
}

/// Install the newest version of an installed package
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn update<R: Runtime + 'static>(
    runtime: R,
    id: &str,
    accept_licenses: bool,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let runtime = Arc::new(runtime);
    let services = Services::build(runtime.clone(), &config);
    let id = PackageId::new(id);

    let Some(current) = services.store.installed_versions(&id)?.pop() else {
        return Err(PackageError::not_found(id.as_str()).into());
    };
    let latest = services.sources.latest_version(&id, false).await?;
    if latest <= current.version {
        println!("{} is up to date", current);
        return Ok(());
    }

    let target = PackageIdentity::new(current.id.clone(), latest);
    debug!("Updating {} to {}", current, target);
    let options = InstallOptions {
        framework: config.framework.clone(),
        ..Default::default()
    };
    install_target(runtime, &services, &target, &options, accept_licenses, &cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::LocalPackageStore;
    use crate::runtime::RealRuntime;
    use crate::test_utils::write_feed_package;
    use tempfile::tempdir;

    fn config(root: &std::path::Path, feed: &std::path::Path) -> Config {
        Config {
            install_root: root.to_path_buf(),
            feeds: vec![feed.to_path_buf()],
            framework: None,
            provided: vec![],
        }
    }

    #[tokio::test]
    async fn test_update_replaces_old_version() {
        let feed = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_feed_package(feed.path(), "Tool", "1.0.0", &[], false);

        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        let cancel = CancellationToken::new();
        install_target(
            Arc::new(RealRuntime),
            &Services::build(Arc::new(RealRuntime), &config(root.path(), feed.path())),
            &"Tool@1.0.0".parse().unwrap(),
            &InstallOptions::default(),
            true,
            &cancel,
        )
        .await
        .unwrap();

        write_feed_package(feed.path(), "Tool", "1.1.0", &[], false);
        updates(RealRuntime, false, config(root.path(), feed.path()), cancel.clone())
            .await
            .unwrap();
        update(RealRuntime, "tool", true, config(root.path(), feed.path()), cancel)
            .await
            .unwrap();

        let installed: Vec<String> = store
            .list_installed()
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(installed, vec!["Tool@1.1.0"]);
    }

    #[tokio::test]
    async fn test_update_requires_installed_package() {
        let feed = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_feed_package(feed.path(), "Tool", "1.0.0", &[], false);

        let err = update(
            RealRuntime,
            "Tool",
            true,
            config(root.path(), feed.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("'Tool'"));
    }
}
