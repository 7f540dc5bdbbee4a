//! Error taxonomy for package operations.
//!
//! Planning errors are raised before anything is applied. Collaborator
//! failures (feeds, filesystem) are converted at the registry/store boundary.

use thiserror::Error;

use crate::package::{PackageIdentity, VersionRange};

/// Errors raised by resolution, installation, uninstallation and queries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PackageError {
    /// The package (or a transitive dependency) is absent from every source.
    #[error("{}", not_found_message(.id, .range.as_ref()))]
    NotFound {
        id: String,
        range: Option<VersionRange>,
    },

    /// Version constraints cannot be satisfied together.
    #[error("Unable to resolve dependencies for '{id}': {reason}")]
    ResolutionConflict { id: String, reason: String },

    /// Removing the package would break packages that stay installed.
    #[error(
        "Unable to uninstall '{package}' because it is required by: {}",
        join_identities(.dependents)
    )]
    DependentsExist {
        package: PackageIdentity,
        dependents: Vec<PackageIdentity>,
    },

    /// A package feed failed (network, protocol or I/O).
    #[error("Package source '{feed}' is unavailable: {message}")]
    SourceUnavailable { feed: String, message: String },

    /// Local install state could not be read or written.
    #[error("Local package store error: {message}")]
    Storage { message: String },

    /// The cancellation signal was observed at a suspension point.
    #[error("Operation was cancelled")]
    Cancelled,
}

impl PackageError {
    pub fn not_found(id: impl Into<String>) -> Self {
        PackageError::NotFound {
            id: id.into(),
            range: None,
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        PackageError::Storage {
            message: err.to_string(),
        }
    }

    /// Whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PackageError::SourceUnavailable { message, .. } => {
                let message = message.to_lowercase();
                message.contains("timed out")
                    || message.contains("timeout")
                    || message.contains("connection")
                    || message.contains("temporarily")
                    || message.contains("interrupted")
            }
            _ => false,
        }
    }
}

fn not_found_message(id: &str, range: Option<&VersionRange>) -> String {
    match range {
        Some(range) => format!(
            "Unable to find a version of '{}' matching {} in any package source",
            id, range
        ),
        None => format!("Unable to find package '{}' in any package source", id),
    }
}

fn join_identities(ids: &[PackageIdentity]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns `Err(Cancelled)` once the token has fired.
pub fn check_cancelled(cancel: &tokio_util::sync::CancellationToken) -> Result<(), PackageError> {
    if cancel.is_cancelled() {
        Err(PackageError::Cancelled)
    } else {
        Ok(())
    }
}
