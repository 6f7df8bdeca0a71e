//! Sandbox configuration types.

use crate::error::{CoreError, Result};
use kennel_domain::{DomainConfig, FilesystemSpec, DEFAULT_HYPERVISOR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of network creation attempts with address discovery.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Configuration for provisioning one sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Hypervisor connection locator (default: `lxc:///`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypervisor: Option<String>,
    /// Domain definition template and shared folders.
    pub domain: DomainConfig,
    /// Network to attach the sandbox to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSetting>,
    /// Shared folder whose host directory is removed on cleanup.
    ///
    /// Falls back to `domain.filesystem` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemSpec>,
    /// Disk settings, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<serde_json::Value>,
}

impl ResourcesConfig {
    pub fn new(domain: DomainConfig) -> Self {
        Self {
            hypervisor: None,
            domain,
            network: None,
            filesystem: None,
            disk: None,
        }
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_hypervisor(mut self, uri: impl Into<String>) -> Self {
        self.hypervisor = Some(uri.into());
        self
    }

    pub fn with_network(mut self, network: NetworkSetting) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_filesystem(mut self, filesystem: impl Into<FilesystemSpec>) -> Self {
        self.filesystem = Some(filesystem.into());
        self
    }

    /// Hypervisor locator, falling back to the LXC default.
    pub fn hypervisor_uri(&self) -> &str {
        self.hypervisor.as_deref().unwrap_or(DEFAULT_HYPERVISOR)
    }

    /// Host directory removed on cleanup: first declared mount joined with `identity`.
    ///
    /// Taken from the top-level `filesystem`, falling back to
    /// `domain.filesystem` when the top-level key is absent.
    pub fn cleanup_path(&self, identity: &str) -> Option<PathBuf> {
        self.filesystem
            .as_ref()
            .or(self.domain.filesystem.as_ref())
            .and_then(|fs| fs.cleanup_path(identity))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.domain.configuration.as_os_str().is_empty() {
            return Err(CoreError::Config("domain.configuration is required".into()));
        }
        if let Some(hypervisor) = &self.hypervisor {
            if hypervisor.is_empty() {
                return Err(CoreError::Config("hypervisor must not be empty".into()));
            }
        }
        if let Some(NetworkSetting::Lookup(name)) = &self.network {
            if name.is_empty() {
                return Err(CoreError::Config(
                    "network name to look up must not be empty".into(),
                ));
            }
        }
        if let Some(NetworkSetting::Create(network)) = &self.network {
            if network.max_attempts == 0 {
                return Err(CoreError::Config("network.max_attempts must be > 0".into()));
            }
        }
        Ok(())
    }
}

/// How the sandbox network is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkSetting {
    /// Attach to an existing network by name; it is never deleted.
    Lookup(String),
    /// Create a dedicated network, deleted on cleanup.
    Create(NetworkConfig),
}

/// Settings for a network created for the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Path to the base `<network>` definition (default: NAT forward only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<PathBuf>,
    /// Pick a free `192.168.X.0/24` subnet when the definition has no `<ip>`.
    #[serde(default)]
    pub ip_autodiscovery: bool,
    /// Creation attempts with address discovery (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            configuration: None,
            ip_autodiscovery: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
