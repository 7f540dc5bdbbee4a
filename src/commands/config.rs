use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::PathBuf;

use crate::runtime::Runtime;

/// Settings shared by every command, assembled from CLI flags and environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub install_root: PathBuf,
    /// Feed directories, queried in order
    pub feeds: Vec<PathBuf>,
    pub framework: Option<String>,
    /// Package ids the host already provides
    pub provided: Vec<String>,
}

/// Values supplied on the command line (or through their env fallbacks).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub install_root: Option<PathBuf>,
    pub feeds: Vec<PathBuf>,
    pub framework: Option<String>,
    pub provided: Vec<String>,
}

impl Config {
    pub fn load<R: Runtime>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let install_root = match overrides.install_root {
            Some(path) => path,
            None => default_install_root(runtime)?,
        };
        debug!("Using install root: {:?}", install_root);

        if overrides.feeds.is_empty() {
            warn!("No package feeds configured; use --feed or FLOWPACK_FEEDS");
        }

        Ok(Self {
            install_root,
            feeds: overrides.feeds,
            framework: overrides.framework,
            provided: overrides.provided,
        })
    }
}

/// `~/.flowpack/packages`
pub fn default_install_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".flowpack").join("packages"))
}
