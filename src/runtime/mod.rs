//! Runtime abstraction for system operations.
//!
//! Every filesystem access and user prompt goes through [`Runtime`] so the
//! store, feeds and license prompts can be exercised with a mock.
//!
//! # Structure
//!
//! - `env` - Well-known directories
//! - `fs` - File system operations (read, write, directory)
//! - `user` - User interaction (confirmation prompts)

mod env;
mod fs;
mod user;

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;

    // User interaction
    /// Prompt user for confirmation. Returns true if user confirms (y/yes), false otherwise.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_impl(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirm_impl(prompt)
    }
}
