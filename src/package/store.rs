//! Local install state.
//!
//! Layout: `<root>/<id-lowercase>/<version>/` holding `manifest.json` and
//! `content.pkg`. This is the only durable state; every install or removal
//! commit goes through one lock so commits never interleave.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use super::{PackageDependencyInfo, PackageId, PackageIdentity, PackageMetadata, SourceId};
use crate::error::PackageError;
use crate::runtime::Runtime;

const MANIFEST_FILE: &str = "manifest.json";
const CONTENT_FILE: &str = "content.pkg";

/// Handle to an installed package's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub identity: PackageIdentity,
    pub install_path: PathBuf,
}

impl InstalledPackage {
    pub fn content_path(&self) -> PathBuf {
        self.install_path.join(CONTENT_FILE)
    }
}

/// Store for locally installed packages.
pub struct LocalPackageStore<R: Runtime> {
    runtime: Arc<R>,
    root: PathBuf,
    commit_lock: Mutex<()>,
}

impl<R: Runtime> LocalPackageStore<R> {
    pub fn new(runtime: Arc<R>, root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            root: root.into(),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns: `<root>/<id-lowercase>`
    pub fn package_dir(&self, id: &PackageId) -> PathBuf {
        self.root.join(id.key())
    }

    /// Returns: `<root>/<id-lowercase>/<version>`
    pub fn version_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(&identity.id)
            .join(identity.version.to_string())
    }

    fn staging_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_dir(&identity.id)
            .join(format!(".{}.partial", identity.version))
    }

    pub fn manifest_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.version_dir(identity).join(MANIFEST_FILE)
    }

    pub fn is_installed(&self, identity: &PackageIdentity) -> bool {
        self.runtime.exists(&self.manifest_path(identity))
    }

    /// Content handle for an installed package.
    pub fn handle(&self, identity: &PackageIdentity) -> Option<InstalledPackage> {
        self.is_installed(identity).then(|| InstalledPackage {
            identity: identity.clone(),
            install_path: self.version_dir(identity),
        })
    }

    /// Load the stored manifest, `None` if not installed.
    pub fn load_manifest(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<PackageMetadata>, PackageError> {
        let path = self.manifest_path(identity);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        PackageMetadata::load(self.runtime.as_ref(), &path)
            .map(Some)
            .map_err(|e| PackageError::storage(format!("{:#}", e)))
    }

    /// Dependency record for an installed package.
    pub fn dependency_info(
        &self,
        identity: &PackageIdentity,
        framework: Option<&str>,
    ) -> Result<Option<PackageDependencyInfo>, PackageError> {
        Ok(self.load_manifest(identity)?.map(|meta| {
            PackageDependencyInfo::from_metadata(&meta, SourceId::local(), framework)
        }))
    }

    /// Every installed package, sorted by identity.
    pub fn list_installed(&self) -> Result<Vec<PackageIdentity>, PackageError> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|meta| meta.identity())
            .collect())
    }

    /// Installed versions of `id`, ascending.
    pub fn installed_versions(&self, id: &PackageId) -> Result<Vec<PackageIdentity>, PackageError> {
        let package_dir = self.package_dir(id);
        if !self.runtime.exists(&package_dir) {
            return Ok(vec![]);
        }
        let mut versions = Vec::new();
        for meta in self.scan_package_dir(&package_dir)? {
            versions.push(meta.identity());
        }
        versions.sort();
        Ok(versions)
    }

    /// Consistent view of all installed manifests.
    ///
    /// Taken under the commit lock so no commit is half-visible.
    pub fn snapshot(&self) -> Result<Vec<PackageMetadata>, PackageError> {
        let _guard = self.lock();
        self.scan()
    }

    /// Write `content` and `meta` into place for one package.
    ///
    /// The package is staged in a hidden directory and renamed into place, so
    /// a failure leaves the previous state untouched. Installing an already
    /// installed identity returns the existing handle.
    pub fn commit_install(
        &self,
        meta: &PackageMetadata,
        content: &[u8],
    ) -> Result<InstalledPackage, PackageError> {
        let identity = meta.identity();
        let _guard = self.lock();

        let final_dir = self.version_dir(&identity);
        if self.runtime.exists(&final_dir.join(MANIFEST_FILE)) {
            debug!("{} is already installed", identity);
            return Ok(InstalledPackage {
                identity,
                install_path: final_dir,
            });
        }

        let staging = self.staging_dir(&identity);
        let result = self.stage_and_rename(meta, content, &staging, &final_dir);
        if result.is_err() && self.runtime.exists(&staging) {
            if let Err(e) = self.runtime.remove_dir_all(&staging) {
                warn!("Failed to clean up {:?}: {:#}", staging, e);
            }
        }
        result.map_err(|e| PackageError::storage(format!("installing {}: {:#}", identity, e)))?;

        debug!("Committed {} to {:?}", identity, final_dir);
        Ok(InstalledPackage {
            identity,
            install_path: final_dir,
        })
    }

    fn stage_and_rename(
        &self,
        meta: &PackageMetadata,
        content: &[u8],
        staging: &Path,
        final_dir: &Path,
    ) -> anyhow::Result<()> {
        if self.runtime.exists(staging) {
            self.runtime.remove_dir_all(staging)?;
        }
        self.runtime.create_dir_all(staging)?;
        self.runtime.write(&staging.join(CONTENT_FILE), content)?;
        let manifest = serde_json::to_string_pretty(meta)?;
        self.runtime
            .write(&staging.join(MANIFEST_FILE), manifest.as_bytes())?;
        if self.runtime.exists(final_dir) {
            // Leftover directory without a manifest
            self.runtime.remove_dir_all(final_dir)?;
        }
        self.runtime.rename(staging, final_dir)?;
        Ok(())
    }

    /// Remove one installed package version.
    ///
    /// The package directory is removed too once its last version is gone.
    pub fn remove(&self, identity: &PackageIdentity) -> Result<(), PackageError> {
        let _guard = self.lock();

        let version_dir = self.version_dir(identity);
        if self.runtime.exists(&version_dir) {
            self.runtime
                .remove_dir_all(&version_dir)
                .map_err(|e| PackageError::storage(format!("removing {}: {:#}", identity, e)))?;
        }

        let package_dir = self.package_dir(&identity.id);
        if self.runtime.exists(&package_dir)
            && let Ok(entries) = self.runtime.read_dir(&package_dir)
            && entries.is_empty()
            && let Err(e) = self.runtime.remove_dir_all(&package_dir)
        {
            warn!("Could not remove empty directory {:?}: {:#}", package_dir, e);
        }
        debug!("Removed {}", identity);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn scan(&self) -> Result<Vec<PackageMetadata>, PackageError> {
        let mut manifests = Vec::new();
        if !self.runtime.exists(&self.root) {
            return Ok(manifests);
        }
        let entries = self
            .runtime
            .read_dir(&self.root)
            .map_err(|e| PackageError::storage(format!("{:#}", e)))?;
        for package_dir in entries {
            if self.runtime.is_dir(&package_dir) && !is_hidden(&package_dir) {
                manifests.extend(self.scan_package_dir(&package_dir)?);
            }
        }
        manifests.sort_by_key(|m| m.identity());
        Ok(manifests)
    }

    fn scan_package_dir(&self, package_dir: &Path) -> Result<Vec<PackageMetadata>, PackageError> {
        let mut manifests = Vec::new();
        let entries = self
            .runtime
            .read_dir(package_dir)
            .map_err(|e| PackageError::storage(format!("{:#}", e)))?;
        for version_dir in entries {
            if !self.runtime.is_dir(&version_dir) || is_hidden(&version_dir) {
                continue;
            }
            let manifest_path = version_dir.join(MANIFEST_FILE);
            if !self.runtime.exists(&manifest_path) {
                continue;
            }
            match PackageMetadata::load(self.runtime.as_ref(), &manifest_path) {
                Ok(meta) => manifests.push(meta),
                Err(e) => warn!("Failed to load manifest {:?}: {:#}", manifest_path, e),
            }
        }
        Ok(manifests)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
