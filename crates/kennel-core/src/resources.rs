//! Resources type - one provisioned sandbox and everything it owns.

use crate::config::{NetworkSetting, ResourcesConfig};
use crate::error::{CoreError, Result};
use crate::network;
use kennel_domain::{
    check_identity, domain_create, domain_delete, Connector, HostFs, Hypervisor, Network,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a sandbox, used as both its domain name and its uuid.
///
/// It also names the sandbox's subdirectory under every shared folder, so
/// [`Resources::new`] only accepts identities that are a single path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(String);

impl SandboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random sandbox ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the identity is usable as a host directory name.
    pub fn validate(&self) -> Result<()> {
        check_identity(&self.0).map_err(|e| CoreError::Config(e.to_string()))
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SandboxId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SandboxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for SandboxId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A network handle together with who is responsible for deleting it.
#[derive(Debug)]
pub enum NetworkBinding<N> {
    /// Created for this sandbox; deleted on cleanup.
    Owned(N),
    /// Pre-existing network; left alone on cleanup.
    Borrowed(N),
}

impl<N> NetworkBinding<N> {
    pub fn handle(&self) -> &N {
        match self {
            Self::Owned(network) | Self::Borrowed(network) => network,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// A provisioned sandbox: hypervisor connection, optional network, domain.
///
/// Construction is all-or-nothing: either every resource is set up or an
/// error is returned and no `Resources` exists. [`Resources::cleanup`]
/// consumes the value, so resources cannot be released twice.
pub struct Resources<H: Hypervisor, F: HostFs> {
    identity: SandboxId,
    config: ResourcesConfig,
    fs: F,
    hypervisor: H,
    network: Option<NetworkBinding<H::Network>>,
    domain: H::Domain,
}

impl<H: Hypervisor, F: HostFs> Resources<H, F> {
    /// Provision the sandbox `identity`.
    ///
    /// This will:
    /// 1. Open the hypervisor connection
    /// 2. Look up or create the network, if one is configured
    /// 3. Define the domain attached to that network
    ///
    /// # Errors
    /// [`CoreError::Config`] for an identity that is not a single path
    /// component or an invalid configuration; nothing is touched then.
    /// Any failing step aborts provisioning. Resources set up by earlier
    /// steps are not released.
    pub async fn new<C>(
        connector: &C,
        fs: F,
        identity: impl Into<SandboxId>,
        config: ResourcesConfig,
    ) -> Result<Self>
    where
        C: Connector<Hypervisor = H>,
    {
        let identity = identity.into();
        let start = std::time::Instant::now();
        identity.validate()?;
        config.validate()?;

        let uri = config.hypervisor_uri();
        tracing::info!(sandbox_id = %identity, hypervisor = %uri, "Provisioning sandbox");
        let hypervisor = connector.open(uri).await?;

        let network = match &config.network {
            Some(NetworkSetting::Lookup(name)) => Some(NetworkBinding::Borrowed(
                network::lookup(&hypervisor, name).await?,
            )),
            Some(NetworkSetting::Create(settings)) => Some(NetworkBinding::Owned(
                network::create(&hypervisor, &fs, identity.as_str(), settings).await?,
            )),
            None => None,
        };
        let network_name = network
            .as_ref()
            .map(|binding| binding.handle().name().to_string());
        tracing::debug!(
            sandbox_id = %identity,
            network = network_name.as_deref().unwrap_or("none"),
            owned = network.as_ref().is_some_and(NetworkBinding::is_owned),
            "Network ready"
        );

        let domain = domain_create(
            &hypervisor,
            &fs,
            identity.as_str(),
            &config.domain,
            network_name.as_deref(),
        )
        .await?;

        tracing::info!(
            sandbox_id = %identity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sandbox provisioned"
        );

        Ok(Self {
            identity,
            config,
            fs,
            hypervisor,
            network,
            domain,
        })
    }

    pub fn identity(&self) -> &SandboxId {
        &self.identity
    }

    pub fn config(&self) -> &ResourcesConfig {
        &self.config
    }

    pub fn hypervisor(&self) -> &H {
        &self.hypervisor
    }

    pub fn domain(&self) -> &H::Domain {
        &self.domain
    }

    /// Network handle, if the sandbox is attached to one.
    pub fn network(&self) -> Option<&H::Network> {
        self.network.as_ref().map(NetworkBinding::handle)
    }

    /// Whether the network was created for this sandbox.
    pub fn network_is_owned(&self) -> bool {
        self.network.as_ref().is_some_and(NetworkBinding::is_owned)
    }

    /// Release every resource of the sandbox.
    ///
    /// Runs domain teardown, then deletes the network if it was created for
    /// this sandbox, then closes the connection. Domain destroy/undefine
    /// failures are logged and absorbed. Every step runs even if an earlier
    /// one failed; the first hard failure (shared folder removal, network
    /// deletion, connection close) is returned at the end.
    pub async fn cleanup(self) -> Result<()> {
        let start = std::time::Instant::now();
        let span = tracing::info_span!("cleanup", sandbox_id = %self.identity);
        tracing::info!(sandbox_id = %self.identity, "Releasing sandbox");

        let mount_path = self.config.cleanup_path(self.identity.as_str());
        let mut first_error: Option<CoreError> = None;

        match domain_delete(&self.domain, &self.fs, &span, mount_path.as_deref()).await {
            Ok(warnings) if !warnings.is_empty() => {
                tracing::warn!(
                    sandbox_id = %self.identity,
                    warnings = warnings.len(),
                    "Domain teardown finished with warnings"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(sandbox_id = %self.identity, error = %e, "Failed to remove shared folder");
                first_error.get_or_insert(e.into());
            }
        }

        if let Some(NetworkBinding::Owned(owned)) = &self.network {
            if let Err(e) = network::delete(owned).await {
                tracing::error!(
                    sandbox_id = %self.identity,
                    network = %owned.name(),
                    error = %e,
                    "Failed to delete network"
                );
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.hypervisor.close().await {
            tracing::error!(sandbox_id = %self.identity, error = %e, "Failed to close hypervisor connection");
            first_error.get_or_insert(e.into());
        }

        tracing::info!(
            sandbox_id = %self.identity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sandbox released"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<H: Hypervisor, F: HostFs> fmt::Debug for Resources<H, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("identity", &self.identity)
            .field("hypervisor", &self.hypervisor.uri())
            .field("network", &self.network().map(|n| n.name()))
            .field("network_owned", &self.network_is_owned())
            .finish_non_exhaustive()
    }
}
