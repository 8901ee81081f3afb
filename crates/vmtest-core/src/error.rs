//! Error types for composition and verification.
//!
//! Composition-time problems are [`ConfigError`]s: they abort the whole matrix
//! build because nothing downstream is valid. Problems reading a collected
//! artifact are [`ArtifactError`]s. A verification predicate that does not
//! hold is *not* an error; see [`crate::verify::Verdict`].

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for composition operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors detected while registering traits or composing the matrix.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two release traits were registered under the same identifier.
    #[error("duplicate release identifier: {0}")]
    DuplicateRelease(String),

    /// Two scenario traits were registered under the same identifier.
    #[error("duplicate scenario identifier: {0}")]
    DuplicateScenario(String),

    /// A compatibility rule or selection names a release that is not registered.
    #[error("unknown release: {0}")]
    UnknownRelease(String),

    /// A compatibility rule or selection names a scenario that is not registered.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// An identifier contains characters outside `[a-z0-9._-]`.
    #[error("invalid identifier {0:?}: expected lowercase ascii letters, digits, '.', '-' or '_'")]
    InvalidIdentifier(String),

    /// A scenario references an installer config file that does not exist.
    #[error("scenario '{scenario}' references missing config file {}", path.display())]
    MissingConfigFile { scenario: String, path: PathBuf },

    /// An assertion pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Any other invalid configuration value.
    #[error("configuration error: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates a generic invalid-configuration error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Returns true if this error reports a duplicate registration.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRelease(_) | Self::DuplicateScenario(_))
    }
}

/// Errors reading the artifact store that are not plain absence.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Artifact names are flat: no separators, no parent references.
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),

    /// The artifact exists but could not be read.
    #[error("failed to read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store directory itself could not be prepared or listed.
    #[error("artifact store I/O error at {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
