//! Error types for the runner.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use vmtest_core::ArtifactError;

/// Failure reported by a [`VmBackend`](crate::backend::VmBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The launcher could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A launcher subcommand exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Local I/O around the backend, such as writing the spec file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend broke its own contract.
    #[error("backend error: {0}")]
    Backend(String),
}

impl BackendError {
    /// Creates a generic backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Pipeline phase a unit error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provision,
    Collect,
    Verify,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Provision => "provision",
            Self::Collect => "collect",
            Self::Verify => "verify",
        })
    }
}

/// Per-unit execution error. Never aborts other units.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] BackendError),

    #[error("provisioning timed out after {0:?}")]
    ProvisioningTimeout(Duration),

    #[error("collection failed: {0}")]
    Collection(#[source] BackendError),

    #[error("collection timed out after {0:?}")]
    CollectionTimeout(Duration),

    #[error("artifact store error: {source}")]
    Artifacts {
        phase: Phase,
        #[source]
        source: ArtifactError,
    },
}

impl UnitError {
    /// Returns the phase the error happened in.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Provisioning(_) | Self::ProvisioningTimeout(_) => Phase::Provision,
            Self::Collection(_) | Self::CollectionTimeout(_) => Phase::Collect,
            Self::Artifacts { phase, .. } => *phase,
        }
    }

    /// Wraps an artifact error raised during `phase`, for use with `map_err`.
    pub fn artifacts(phase: Phase) -> impl FnOnce(ArtifactError) -> Self {
        move |source| Self::Artifacts { phase, source }
    }

    /// Returns true for either timeout variant.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ProvisioningTimeout(_) | Self::CollectionTimeout(_))
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write run report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type alias for whole-run operations.
pub type Result<T> = std::result::Result<T, RunError>;
