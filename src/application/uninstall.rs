//! Uninstall use case - plans a removal and applies it one package at a time.

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::SkippedPackage;
use crate::error::{PackageError, check_cancelled};
use crate::package::{LocalPackageStore, PackageIdentity};
use crate::plugin::PluginRegistry;
use crate::runtime::Runtime;
use crate::uninstall::{DependencyGraph, plan_uninstall};

/// Options for the uninstall use case
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Also remove dependencies nothing else needs
    pub remove_dependencies: bool,
    /// Remove targets even when installed packages depend on them
    pub force_remove_targets: bool,
    /// Framework used to read dependency groups of installed packages
    pub framework: Option<String>,
}

/// What an uninstall actually did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UninstallReport {
    pub removed: Vec<PackageIdentity>,
    pub skipped: Vec<SkippedPackage>,
}

pub struct UninstallUseCase<'a, R: Runtime> {
    store: &'a LocalPackageStore<R>,
    plugins: &'a PluginRegistry,
}

impl<'a, R: Runtime> UninstallUseCase<'a, R> {
    pub fn new(store: &'a LocalPackageStore<R>, plugins: &'a PluginRegistry) -> Self {
        Self { store, plugins }
    }

    /// Build the dependency graph from a consistent snapshot of the store.
    pub fn graph(&self, framework: Option<&str>) -> Result<DependencyGraph, PackageError> {
        let manifests = self.store.snapshot()?;
        Ok(DependencyGraph::from_manifests(&manifests, framework))
    }

    /// Ordered removal list, without touching anything.
    pub fn plan(
        &self,
        targets: &[PackageIdentity],
        options: &UninstallOptions,
    ) -> Result<Vec<PackageIdentity>, PackageError> {
        let graph = self.graph(options.framework.as_deref())?;
        plan_uninstall(
            &graph,
            targets,
            options.remove_dependencies,
            options.force_remove_targets,
        )
    }

    pub async fn uninstall(
        &self,
        targets: &[PackageIdentity],
        options: &UninstallOptions,
        cancel: &CancellationToken,
    ) -> Result<UninstallReport, PackageError> {
        let plan = self.plan(targets, options)?;
        self.execute(&plan, cancel).await
    }

    /// Remove the packages in `plan`, in order.
    ///
    /// Each removal is committed on its own. Cancellation stops before the
    /// next package and keeps what was already removed.
    pub async fn execute(
        &self,
        plan: &[PackageIdentity],
        cancel: &CancellationToken,
    ) -> Result<UninstallReport, PackageError> {
        let mut report = UninstallReport::default();
        for identity in plan {
            check_cancelled(cancel)?;

            let Some(package) = self.store.handle(identity) else {
                debug!("{} is no longer installed", identity);
                continue;
            };
            if let Some(plugin) = self.plugins.uninstalling(&package).await {
                report.skipped.push(SkippedPackage {
                    identity: identity.clone(),
                    plugin,
                });
                continue;
            }

            self.store.remove(identity)?;
            info!("Removed {}", identity);
            self.plugins.uninstalled(&package).await;
            report.removed.push(identity.clone());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{DependencyGroup, DependencyRange, PackageMetadata, parse_version};
    use crate::plugin::{MockPackagePlugin, ProvidedPackagesPlugin};
    use crate::runtime::RealRuntime;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn identity(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    fn install(store: &LocalPackageStore<RealRuntime>, id: &str, deps: &[(&str, &str)]) {
        let (name, version) = id.split_once('@').unwrap();
        let mut meta = PackageMetadata::new(name, parse_version(version).unwrap());
        meta.dependency_groups = vec![DependencyGroup {
            framework: None,
            dependencies: deps
                .iter()
                .map(|(dep, range)| DependencyRange::new(*dep, range.parse().unwrap()))
                .collect(),
        }];
        store.commit_install(&meta, b"").unwrap();
    }

    #[tokio::test]
    async fn test_uninstall_with_dependencies() {
        let root = tempdir().unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        install(&store, "Q@1.0.0", &[("P", "1.0")]);
        install(&store, "P@1.0.0", &[]);
        install(&store, "Other@1.0.0", &[]);

        let plugins = PluginRegistry::new();
        let use_case = UninstallUseCase::new(&store, &plugins);
        let options = UninstallOptions {
            remove_dependencies: true,
            ..Default::default()
        };
        let report = use_case
            .uninstall(&[identity("Q@1.0.0")], &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.removed, vec![identity("Q@1.0.0"), identity("P@1.0.0")]);
        assert_eq!(store.list_installed().unwrap(), vec![identity("Other@1.0.0")]);
    }

    #[tokio::test]
    async fn test_dependents_exist_changes_nothing() {
        let root = tempdir().unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        install(&store, "Q@1.0.0", &[("P", "1.0")]);
        install(&store, "P@1.0.0", &[]);

        let plugins = PluginRegistry::new();
        let use_case = UninstallUseCase::new(&store, &plugins);
        let err = use_case
            .uninstall(
                &[identity("P@1.0.0")],
                &UninstallOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PackageError::DependentsExist { .. }));
        assert_eq!(store.list_installed().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_plugin_veto_keeps_package() {
        let root = tempdir().unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        install(&store, "Host.Runtime@1.0.0", &[]);
        install(&store, "Core@1.0.0", &[]);

        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(ProvidedPackagesPlugin::new(["host.runtime"])));
        let use_case = UninstallUseCase::new(&store, &plugins);

        let report = use_case
            .execute(
                &[identity("Host.Runtime@1.0.0"), identity("Core@1.0.0")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.removed, vec![identity("Core@1.0.0")]);
        assert_eq!(
            report.skipped,
            vec![SkippedPackage {
                identity: identity("Host.Runtime@1.0.0"),
                plugin: "provided-packages".into(),
            }]
        );
        assert!(store.is_installed(&identity("Host.Runtime@1.0.0")));
    }

    #[tokio::test]
    async fn test_uninstalled_hook_runs_after_removal() {
        let root = tempdir().unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        install(&store, "Core@1.0.0", &[]);

        let mut plugin = MockPackagePlugin::new();
        plugin.expect_name().return_const("watcher".to_string());
        plugin.expect_on_uninstalling().times(1).returning(|_| true);
        plugin
            .expect_on_uninstalled()
            .times(1)
            .withf(|p| p.identity.to_string() == "Core@1.0.0")
            .returning(|_| ());
        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(plugin));

        let use_case = UninstallUseCase::new(&store, &plugins);
        use_case
            .execute(&[identity("Core@1.0.0")], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!store.is_installed(&identity("Core@1.0.0")));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_removal() {
        let root = tempdir().unwrap();
        let store = LocalPackageStore::new(Arc::new(RealRuntime), root.path());
        install(&store, "Core@1.0.0", &[]);

        let plugins = PluginRegistry::new();
        let use_case = UninstallUseCase::new(&store, &plugins);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = use_case
            .execute(&[identity("Core@1.0.0")], &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, PackageError::Cancelled);
        assert!(store.is_installed(&identity("Core@1.0.0")));
    }
}
