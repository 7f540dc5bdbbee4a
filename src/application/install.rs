//! Install use case - orchestrates the package installation flow.
//!
//! This use case coordinates:
//! - Dependency gathering and resolution
//! - License acceptance for the whole install set
//! - Extraction in dependency order, with plugin hooks
//! - Cleanup of versions the new packages supersede

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::{SkippedPackage, UninstallUseCase};
use crate::error::{PackageError, check_cancelled};
use crate::license::LicenseGate;
use crate::package::{
    InstalledPackage, LocalPackageStore, PackageId, PackageIdentity, PackageMetadata, SourceId,
};
use crate::plugin::PluginRegistry;
use crate::resolver::{DependencyBehavior, DependencyGatherer, resolve};
use crate::runtime::Runtime;
use crate::source::{SourceRegistry, TargetFramework};
use crate::uninstall::plan_uninstall;

/// Options for the install use case
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install only the target, not its dependencies
    pub ignore_dependencies: bool,
    /// Version selection policy for dependencies
    pub behavior: DependencyBehavior,
    /// Target framework for dependency groups
    pub framework: Option<String>,
}

impl InstallOptions {
    fn effective_behavior(&self) -> DependencyBehavior {
        if self.ignore_dependencies {
            DependencyBehavior::Ignore
        } else {
            self.behavior
        }
    }
}

/// What an install did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    /// Handle for the target, `None` if a plugin vetoed it
    pub package: Option<InstalledPackage>,
    /// Packages extracted by this operation, in order
    pub installed: Vec<InstalledPackage>,
    /// Packages a plugin vetoed
    pub skipped: Vec<SkippedPackage>,
    /// Superseded versions removed afterwards
    pub removed: Vec<PackageIdentity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    /// The target was already installed; nothing was done.
    AlreadyInstalled(InstalledPackage),
    Installed(InstallReport),
    /// The license batch was declined before anything was extracted.
    Cancelled { declined: Vec<PackageIdentity> },
}

/// A package of the resolved set that still has to be extracted.
struct PendingInstall {
    meta: PackageMetadata,
    source: SourceId,
}

/// Install use case
pub struct InstallUseCase<'a, R: Runtime> {
    store: &'a LocalPackageStore<R>,
    sources: &'a SourceRegistry,
    plugins: &'a PluginRegistry,
    licenses: &'a dyn LicenseGate,
}

impl<'a, R: Runtime> InstallUseCase<'a, R> {
    pub fn new(
        store: &'a LocalPackageStore<R>,
        sources: &'a SourceRegistry,
        plugins: &'a PluginRegistry,
        licenses: &'a dyn LicenseGate,
    ) -> Self {
        Self {
            store,
            sources,
            plugins,
            licenses,
        }
    }

    /// Install `target` and whatever it needs.
    ///
    /// Nothing is extracted unless planning and license acceptance succeed.
    /// Packages are committed one at a time, so a failure or cancellation
    /// during extraction keeps the packages already committed and stops
    /// before the next one.
    #[tracing::instrument(skip(self, options, cancel))]
    pub async fn install(
        &self,
        target: &PackageIdentity,
        options: &InstallOptions,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome, PackageError> {
        if let Some(existing) = self.store.handle(target) {
            info!("{} is already installed", target);
            return Ok(InstallOutcome::AlreadyInstalled(existing));
        }

        let behavior = options.effective_behavior();
        let framework = TargetFramework::from(options.framework.clone());
        let pool = DependencyGatherer::new(self.store, self.sources, framework, behavior)
            .gather(target, cancel)
            .await?;
        let installed: BTreeSet<PackageIdentity> =
            self.store.list_installed()?.into_iter().collect();
        let order = resolve(target, &pool, &installed, behavior)?;
        debug!(
            "Install order for {}: {}",
            target,
            order
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut pending = Vec::new();
        let mut license_batch = Vec::new();
        let mut superseded: BTreeMap<PackageId, Vec<PackageIdentity>> = BTreeMap::new();
        for identity in &order {
            if installed.contains(identity) {
                continue;
            }
            check_cancelled(cancel)?;
            let source = pool
                .get(identity)
                .map(|info| info.source.clone())
                .ok_or_else(|| PackageError::not_found(identity.to_string()))?;
            let meta = self.sources.get_metadata(identity, Some(&source)).await?;
            if meta.requires_license_acceptance {
                license_batch.push(meta.clone());
            }

            let older: Vec<PackageIdentity> = installed
                .iter()
                .filter(|p| p.id == identity.id && p.version != identity.version)
                .cloned()
                .collect();
            if !older.is_empty() {
                superseded.insert(identity.id.clone(), older);
            }
            pending.push(PendingInstall { meta, source });
        }

        if !license_batch.is_empty() {
            check_cancelled(cancel)?;
            if !self.accept_licenses(&license_batch).await {
                info!("License agreement declined, nothing was installed");
                return Ok(InstallOutcome::Cancelled {
                    declined: license_batch.iter().map(|m| m.identity()).collect(),
                });
            }
        }

        let mut report = InstallReport::default();
        let mut cleanup = Vec::new();
        for PendingInstall { meta, source } in pending {
            check_cancelled(cancel)?;
            let identity = meta.identity();
            let content = self.sources.get_content(&identity, Some(&source)).await?;

            let install_path = self.store.version_dir(&identity);
            if let Some(plugin) = self
                .plugins
                .installing(&identity, &content, &install_path)
                .await
            {
                report.skipped.push(SkippedPackage { identity, plugin });
                continue;
            }

            let package = self.store.commit_install(&meta, &content)?;
            info!("Installed {}", identity);
            self.plugins.installed(&package).await;

            if let Some(older) = superseded.remove(&identity.id) {
                cleanup.extend(older);
            }
            report.installed.push(package);
        }

        if !cleanup.is_empty() {
            report.removed = self
                .remove_superseded(&cleanup, options.framework.as_deref(), cancel)
                .await?;
        }

        report.package = self.store.handle(target);
        Ok(InstallOutcome::Installed(report))
    }

    async fn accept_licenses(&self, batch: &[PackageMetadata]) -> bool {
        match self.licenses.accept_licenses(batch).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("License prompt failed, treating as declined: {:#}", e);
                false
            }
        }
    }

    /// Remove superseded versions nothing else still needs.
    ///
    /// A superseded version with an installed dependent outside the cleanup
    /// set (for example one pinned to exactly that version) is kept.
    async fn remove_superseded(
        &self,
        superseded: &[PackageIdentity],
        framework: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageIdentity>, PackageError> {
        let uninstall = UninstallUseCase::new(self.store, self.plugins);
        let graph = uninstall.graph(framework)?;

        let cleanup: BTreeSet<&PackageIdentity> = superseded.iter().collect();
        let removable: Vec<PackageIdentity> = superseded
            .iter()
            .filter(|old| {
                let blocked = graph
                    .dependents(old)
                    .iter()
                    .any(|dependent| !cleanup.contains(dependent));
                if blocked {
                    info!("Keeping {}: installed packages still depend on it", old);
                }
                !blocked
            })
            .cloned()
            .collect();
        if removable.is_empty() {
            return Ok(vec![]);
        }

        let plan = plan_uninstall(&graph, &removable, false, true)?;
        let report = uninstall.execute(&plan, cancel).await?;
        Ok(report.removed)
    }
}
