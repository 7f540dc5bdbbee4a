use std::sync::Arc;

use anyhow::Result;
use log::debug;

use crate::{package::LocalPackageStore, runtime::Runtime};

use super::config::Config;

/// List all installed packages
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: R, config: Config) -> Result<()> {
    debug!("Listing packages from {:?}", config.install_root);
    let store = LocalPackageStore::new(Arc::new(runtime), config.install_root);

    let installed = store.list_installed()?;
    if installed.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    debug!("Found {} package(s)", installed.len());
    for identity in installed {
        println!("{} {}", identity.id, identity.version);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn config(root: &str) -> Config {
        Config {
            install_root: PathBuf::from(root),
            feeds: vec![],
            framework: None,
            provided: vec![],
        }
    }

    #[test]
    fn test_list_no_packages() {
        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/home/user/.flowpack/packages");

        runtime
            .expect_exists()
            .with(eq(root.clone()))
            .returning(|_| true);
        runtime
            .expect_read_dir()
            .with(eq(root))
            .returning(|_| Ok(vec![]));

        assert!(list(runtime, config("/home/user/.flowpack/packages")).is_ok());
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);
        runtime.expect_read_dir().never();

        assert!(list(runtime, config("/nowhere")).is_ok());
    }

    #[test]
    fn test_list_unreadable_root_fails() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_dir()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        let err = list(runtime, config("/locked")).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }
}
