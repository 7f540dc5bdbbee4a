use std::sync::Arc;

use anyhow::Result;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    application::{UninstallOptions, UninstallUseCase},
    error::PackageError,
    package::{PackageIdentity, PackageSpec},
    runtime::Runtime,
};

use super::config::Config;
use super::services::Services;

/// Uninstall a package version, or every installed version of a package
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn uninstall<R: Runtime + 'static>(
    runtime: R,
    spec_str: &str,
    remove_dependencies: bool,
    force: bool,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let spec = spec_str.parse::<PackageSpec>()?;
    let services = Services::build(Arc::new(runtime), &config);

    let targets = match spec.version {
        Some(version) => vec![PackageIdentity::new(spec.id.clone(), version)],
        None => services.store.installed_versions(&spec.id)?,
    };
    if targets.is_empty() {
        return Err(PackageError::not_found(spec.id.as_str()).into());
    }
    debug!("Uninstall targets: {:?}", targets);

    let options = UninstallOptions {
        remove_dependencies,
        force_remove_targets: force,
        framework: config.framework.clone(),
    };
    let action = UninstallUseCase::new(&services.store, &services.plugins);
    let report = action.uninstall(&targets, &options, &cancel).await?;

    for removed in &report.removed {
        println!("Removed {}", removed);
    }
    for skipped in &report.skipped {
        println!("Kept {} (provided by {})", skipped.identity, skipped.plugin);
    }
    Ok(())
}
