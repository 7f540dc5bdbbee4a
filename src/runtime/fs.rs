//! File system operations (read, write, directory).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).context("Failed to write to file")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_impl(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn rename_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).context("Failed to rename")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).context("Failed to create directory")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).context("Failed to remove directory and its contents")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {:?}", path))?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}
