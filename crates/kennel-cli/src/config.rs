//! Configuration for the launcher.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use kennel_core::SandboxId;
use kennel_domain::{check_identity, DEFAULT_VIRSH};
use std::path::PathBuf;

/// Default location of the sandbox configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kennel/sandbox.json";

/// Configuration for the `kennel` launcher.
#[derive(Debug, Clone)]
pub struct KennelConfig {
    /// Path to the JSON sandbox configuration.
    pub config_path: PathBuf,

    /// Sandbox identity; generated when not set.
    pub sandbox_id: SandboxId,

    /// `virsh` binary used to drive libvirt.
    pub virsh_path: PathBuf,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sandbox configuration not found: {0}")]
    MissingConfig(PathBuf),

    #[error("invalid sandbox id {0:?}: must be a single path component")]
    InvalidSandboxId(String),
}

impl Default for KennelConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            sandbox_id: SandboxId::generate(),
            virsh_path: PathBuf::from(DEFAULT_VIRSH),
        }
    }
}

impl KennelConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `KENNEL_CONFIG` | `/etc/kennel/sandbox.json` |
    /// | `KENNEL_SANDBOX_ID` | random UUID |
    /// | `KENNEL_VIRSH` | `virsh` |
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        Self {
            config_path: var("KENNEL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(default.config_path),
            sandbox_id: var("KENNEL_SANDBOX_ID")
                .map(SandboxId::from)
                .unwrap_or(default.sandbox_id),
            virsh_path: var("KENNEL_VIRSH")
                .map(PathBuf::from)
                .unwrap_or(default.virsh_path),
        }
    }

    /// Check the configuration before touching the hypervisor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if check_identity(self.sandbox_id.as_str()).is_err() {
            return Err(ConfigError::InvalidSandboxId(self.sandbox_id.to_string()));
        }
        if !self.config_path.exists() {
            return Err(ConfigError::MissingConfig(self.config_path.clone()));
        }
        Ok(())
    }
}
