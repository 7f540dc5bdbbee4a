//! Service factory for building command dependencies.
//!
//! Builds the local store, the feed registry and the plugin registry from a
//! [`Config`]. Services are built from configuration values but are not part
//! of the configuration itself.

use std::sync::Arc;

use log::debug;

use crate::{
    package::LocalPackageStore,
    plugin::{PluginRegistry, ProvidedPackagesPlugin},
    runtime::Runtime,
    source::{FolderSource, SourceRegistry},
};

use super::config::Config;

pub struct Services<R: Runtime> {
    pub store: LocalPackageStore<R>,
    pub sources: Arc<SourceRegistry>,
    pub plugins: PluginRegistry,
}

impl<R: Runtime + 'static> Services<R> {
    pub fn build(runtime: Arc<R>, config: &Config) -> Self {
        Self {
            store: LocalPackageStore::new(runtime.clone(), config.install_root.clone()),
            sources: Arc::new(build_source_registry(runtime, config)),
            plugins: build_plugin_registry(config),
        }
    }
}

/// Register one folder source per configured feed, in order.
pub fn build_source_registry<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for feed in &config.feeds {
        debug!("Registering feed {:?}", feed);
        registry.register(Arc::new(FolderSource::new(runtime.clone(), feed.clone())));
    }
    registry
}

pub fn build_plugin_registry(config: &Config) -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    if !config.provided.is_empty() {
        plugins.register(Arc::new(ProvidedPackagesPlugin::new(
            config.provided.iter().cloned(),
        )));
    }
    plugins
}
