//! Domain configuration as read from the sandbox configuration file.

use crate::error::{DomainError, Result};
use crate::merge::Mount;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Check that `identity` can name a per-sandbox subdirectory.
///
/// The identity is joined onto every shared folder parent, and that
/// directory is removed on teardown, so it must be exactly one plain path
/// component.
pub fn check_identity(identity: &str) -> Result<()> {
    let mut components = Path::new(identity).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == identity => Ok(()),
        _ => Err(DomainError::Definition(format!(
            "invalid sandbox identity {identity:?}: must be a single path component"
        ))),
    }
}

/// Configuration of the sandbox domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Path to the base `<domain>` definition document.
    pub configuration: PathBuf,
    /// Shared folders to expose inside the sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemSpec>,
}

impl DomainConfig {
    pub fn new(configuration: impl Into<PathBuf>) -> Self {
        Self {
            configuration: configuration.into(),
            filesystem: None,
        }
    }

    pub fn with_filesystem(mut self, filesystem: impl Into<FilesystemSpec>) -> Self {
        self.filesystem = Some(filesystem.into());
        self
    }
}

/// One shared folder declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Parent directory on the host. Each sandbox gets its own subdirectory.
    pub source_path: PathBuf,
    /// Mount point inside the sandbox.
    pub target_path: PathBuf,
}

impl MountConfig {
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Host directory backing this mount for the sandbox `identity`.
    pub fn host_path(&self, identity: &str) -> PathBuf {
        self.source_path.join(identity)
    }

    /// Resolve into a concrete mount for the sandbox `identity`.
    pub fn resolve(&self, identity: &str) -> Mount {
        Mount::new(self.host_path(identity), self.target_path.clone())
    }
}

/// Either a single shared folder or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilesystemSpec {
    Single(MountConfig),
    Multiple(Vec<MountConfig>),
}

impl FilesystemSpec {
    /// The declared mounts, in order.
    pub fn mounts(&self) -> &[MountConfig] {
        match self {
            Self::Single(mount) => std::slice::from_ref(mount),
            Self::Multiple(mounts) => mounts,
        }
    }

    /// Host directory of the first mount, used for teardown.
    pub fn cleanup_path(&self, identity: &str) -> Option<PathBuf> {
        self.mounts().first().map(|m| m.host_path(identity))
    }
}

impl From<MountConfig> for FilesystemSpec {
    fn from(mount: MountConfig) -> Self {
        Self::Single(mount)
    }
}

impl From<Vec<MountConfig>> for FilesystemSpec {
    fn from(mounts: Vec<MountConfig>) -> Self {
        Self::Multiple(mounts)
    }
}
