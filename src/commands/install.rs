use std::sync::Arc;

use anyhow::Result;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::{
    application::{InstallOptions, InstallOutcome, InstallUseCase},
    license::{AutoAcceptLicenses, LicenseGate, PromptLicenseGate},
    package::{PackageIdentity, PackageSpec},
    resolver::DependencyBehavior,
    runtime::Runtime,
};

use super::config::Config;
use super::services::Services;

/// Flags of the `install` command
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallFlags {
    pub ignore_dependencies: bool,
    pub lowest: bool,
    pub accept_licenses: bool,
}

/// Install a package and its dependencies
#[tracing::instrument(skip(runtime, config, cancel))]
pub async fn install<R: Runtime + 'static>(
    runtime: R,
    spec_str: &str,
    flags: InstallFlags,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let runtime = Arc::new(runtime);
    let spec = spec_str.parse::<PackageSpec>()?;
    let services = Services::build(runtime.clone(), &config);

    let version = match spec.version {
        Some(version) => version,
        None => services.sources.latest_version(&spec.id, false).await?,
    };
    let target = PackageIdentity::new(spec.id, version);
    debug!("Installing {}", target);

    let options = InstallOptions {
        ignore_dependencies: flags.ignore_dependencies,
        behavior: if flags.lowest {
            DependencyBehavior::Lowest
        } else {
            DependencyBehavior::Highest
        },
        framework: config.framework.clone(),
    };
    install_target(runtime, &services, &target, &options, flags.accept_licenses, &cancel).await
}

/// Run the install use case for one exact identity and print the outcome.
pub(crate) async fn install_target<R: Runtime + 'static>(
    runtime: Arc<R>,
    services: &Services<R>,
    target: &PackageIdentity,
    options: &InstallOptions,
    accept_licenses: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let gate: Box<dyn LicenseGate> = if accept_licenses {
        Box::new(AutoAcceptLicenses)
    } else {
        Box::new(PromptLicenseGate::new(runtime))
    };

    let action = InstallUseCase::new(
        &services.store,
        &services.sources,
        &services.plugins,
        gate.as_ref(),
    );
    let outcome = action.install(target, options, cancel).await?;
    print_outcome(target, &outcome);
    Ok(())
}

fn print_outcome(target: &PackageIdentity, outcome: &InstallOutcome) {
    match outcome {
        InstallOutcome::AlreadyInstalled(package) => {
            println!(
                "{} is already installed at {}",
                target,
                package.install_path.display()
            );
        }
        InstallOutcome::Cancelled { declined } => {
            let names: Vec<String> = declined.iter().map(|p| p.to_string()).collect();
            println!(
                "Installation cancelled: licenses not accepted for {}",
                names.join(", ")
            );
        }
        InstallOutcome::Installed(report) => {
            for package in &report.installed {
                println!("Installed {}", package.identity);
            }
            for skipped in &report.skipped {
                println!("Skipped {} (provided by {})", skipped.identity, skipped.plugin);
            }
            for removed in &report.removed {
                println!("Removed superseded {}", removed);
            }
            if report.installed.is_empty() && report.skipped.is_empty() {
                println!("Nothing to install for {}", target);
            }
        }
    }
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
    async fn test_install_latest_when_no_version_given() {
        let feed = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_feed_package(feed.path(), "Core", "1.0.0", &[], false);
        write_feed_package(feed.path(), "Core", "2.0.0", &[], false);
        write_feed_package(feed.path(), "App", "1.0.0", &[("Core", "1.0")], false);

        install(
            RealRuntime,
            "App",
            InstallFlags::default(),
            config(root.path(), feed.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        let installed: Vec<String> = store
            .list_installed()
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(installed, vec!["App@1.0.0", "Core@2.0.0"]);
    }

    #[tokio::test]
    async fn test_install_lowest_and_ignore_dependencies() {
        let feed = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_feed_package(feed.path(), "Core", "1.0.0", &[], false);
        write_feed_package(feed.path(), "Core", "2.0.0", &[], false);
        write_feed_package(feed.path(), "App", "1.0.0", &[("Core", "1.0")], false);
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());

        let flags = InstallFlags {
            lowest: true,
            ..Default::default()
        };
        install(
            RealRuntime,
            "App@1.0.0",
            flags,
            config(root.path(), feed.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(store.is_installed(&"Core@1.0.0".parse().unwrap()));

        let other_root = tempdir().unwrap();
        let flags = InstallFlags {
            ignore_dependencies: true,
            ..Default::default()
        };
        install(
            RealRuntime,
            "App@1.0.0",
            flags,
            config(other_root.path(), feed.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), other_root.path());
        assert_eq!(store.list_installed().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_unknown_package_fails() {
        let feed = tempdir().unwrap();
        let root = tempdir().unwrap();
        write_feed_package(feed.path(), "Core", "1.0.0", &[], false);

        let err = install(
            RealRuntime,
            "Missing",
            InstallFlags::default(),
            config(root.path(), feed.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unable to find package 'Missing'"));
    }
}
