//! Error types for kennel-domain.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kennel-domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors that can occur while defining or tearing down a domain.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The definition document cannot be parsed or patched.
    #[error("definition error: {0}")]
    Definition(String),

    /// A call into the isolation subsystem failed.
    #[error("operational error: {0}")]
    Operational(String),

    /// A host filesystem primitive failed on a specific path.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path the operation was applied to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error not tied to a particular path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DomainError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the isolation subsystem.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational(_))
    }
}
