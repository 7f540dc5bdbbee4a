//! License acceptance.
//!
//! An install operation asks its gate at most once, with every package in
//! the install set that requires acceptance.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::package::PackageMetadata;
use crate::runtime::Runtime;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LicenseGate: Send + Sync {
    /// Returns `true` if the licenses of every package in `batch` are accepted.
    async fn accept_licenses(&self, batch: &[PackageMetadata]) -> Result<bool>;
}

/// Accepts every license without asking (`--accept-licenses`).
pub struct AutoAcceptLicenses;

#[async_trait]
impl LicenseGate for AutoAcceptLicenses {
    async fn accept_licenses(&self, _batch: &[PackageMetadata]) -> Result<bool> {
        Ok(true)
    }
}

/// Lists the batch and asks for one confirmation.
pub struct PromptLicenseGate<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> PromptLicenseGate<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl<R: Runtime + 'static> LicenseGate for PromptLicenseGate<R> {
    async fn accept_licenses(&self, batch: &[PackageMetadata]) -> Result<bool> {
        println!("The following packages require license acceptance:");
        for meta in batch {
            match &meta.license_url {
                Some(url) => println!("  {} ({})", meta.identity(), url),
                None => println!("  {}", meta.identity()),
            }
        }
        // Reading the answer blocks on stdin
        let runtime = self.runtime.clone();
        tokio::task::spawn_blocking(move || runtime.confirm("Do you accept these licenses?"))
            .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use semver::Version;

    #[tokio::test]
    async fn test_prompt_gate_asks_once() {
        let mut runtime = MockRuntime::new();
        runtime.expect_confirm().times(1).returning(|_| Ok(false));
        let gate = PromptLicenseGate::new(Arc::new(runtime));

        let batch = vec![
            PackageMetadata::new("A", Version::new(1, 0, 0)),
            PackageMetadata::new("B", Version::new(1, 0, 0)),
        ];
        assert!(!gate.accept_licenses(&batch).await.unwrap());
    }

    #[tokio::test]
    async fn test_prompt_runs_off_the_async_thread() {
        let async_thread = std::thread::current().id();
        let mut runtime = MockRuntime::new();
        runtime
            .expect_confirm()
            .times(1)
            .returning(move |_| Ok(std::thread::current().id() != async_thread));
        let gate = PromptLicenseGate::new(Arc::new(runtime));

        let batch = vec![PackageMetadata::new("A", Version::new(1, 0, 0))];
        assert!(gate.accept_licenses(&batch).await.unwrap());
    }

    #[tokio::test]
    async fn test_prompt_error_is_returned() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_confirm()
            .returning(|_| Err(anyhow::anyhow!("stdin closed")));
        let gate = PromptLicenseGate::new(Arc::new(runtime));

        let batch = vec![PackageMetadata::new("A", Version::new(1, 0, 0))];
        let err = gate.accept_licenses(&batch).await.unwrap_err();
        assert!(err.to_string().contains("stdin closed"));
    }

    #[tokio::test]
    async fn test_auto_accept() {
        assert!(AutoAcceptLicenses.accept_licenses(&[]).await.unwrap());
    }
}
