//! Install and uninstall hooks.
//!
//! Plugins are registered by the host at startup. The installing and
//! uninstalling hooks can veto a single package: a veto means the need is
//! already met elsewhere, so only that package is skipped and the rest of
//! the operation continues.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::package::{InstalledPackage, PackageId, PackageIdentity};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackagePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called before `identity` is written to `install_path`. Returning
    /// `false` skips this package.
    async fn on_installing(
        &self,
        _identity: &PackageIdentity,
        _content: &[u8],
        _install_path: &Path,
    ) -> bool {
        true
    }

    async fn on_installed(&self, _package: &InstalledPackage) {}

    /// Called before `package` is removed. Returning `false` keeps it.
    async fn on_uninstalling(&self, _package: &InstalledPackage) -> bool {
        true
    }

    async fn on_uninstalled(&self, _package: &InstalledPackage) {}
}

/// Plugins in registration order.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn PackagePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn PackagePlugin>) {
        debug!("Registered plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run the installing hooks. Returns the name of the first plugin that
    /// vetoes; later plugins are not consulted.
    pub async fn installing(
        &self,
        identity: &PackageIdentity,
        content: &[u8],
        install_path: &Path,
    ) -> Option<String> {
        for plugin in &self.plugins {
            if !plugin.on_installing(identity, content, install_path).await {
                info!("{} vetoed installation of {}", plugin.name(), identity);
                return Some(plugin.name().to_string());
            }
        }
        None
    }

    pub async fn installed(&self, package: &InstalledPackage) {
        for plugin in &self.plugins {
            plugin.on_installed(package).await;
        }
    }

    /// Run the uninstalling hooks. Returns the name of the first plugin that
    /// vetoes.
    pub async fn uninstalling(&self, package: &InstalledPackage) -> Option<String> {
        for plugin in &self.plugins {
            if !plugin.on_uninstalling(package).await {
                info!(
                    "{} vetoed removal of {}",
                    plugin.name(),
                    package.identity
                );
                return Some(plugin.name().to_string());
            }
        }
        None
    }

    pub async fn uninstalled(&self, package: &InstalledPackage) {
        for plugin in &self.plugins {
            plugin.on_uninstalled(package).await;
        }
    }
}

/// Vetoes packages the host application already ships.
pub struct ProvidedPackagesPlugin {
    provided: HashSet<PackageId>,
}

impl ProvidedPackagesPlugin {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PackageId>,
    {
        Self {
            provided: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn provides(&self, id: &PackageId) -> bool {
        self.provided.contains(id)
    }
}

#[async_trait]
impl PackagePlugin for ProvidedPackagesPlugin {
    fn name(&self) -> &str {
        "provided-packages"
    }

    async fn on_installing(
        &self,
        identity: &PackageIdentity,
        _content: &[u8],
        _install_path: &Path,
    ) -> bool {
        !self.provides(&identity.id)
    }

    async fn on_uninstalling(&self, package: &InstalledPackage) -> bool {
        !self.provides(&package.identity.id)
    }
}
