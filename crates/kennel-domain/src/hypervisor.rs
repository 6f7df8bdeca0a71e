//! Interfaces to the isolation subsystem.
//!
//! The lifecycle code only talks to these traits. [`crate::virsh`] provides
//! the production implementation; the `testing` feature provides in-memory
//! doubles.

use crate::error::Result;
use async_trait::async_trait;

/// Default connection locator for LXC domains.
pub const DEFAULT_HYPERVISOR: &str = "lxc:///";

/// Opens connections to the isolation subsystem.
#[async_trait]
pub trait Connector: Send + Sync {
    type Hypervisor: Hypervisor;

    /// Open a connection to the subsystem at `uri`.
    async fn open(&self, uri: &str) -> Result<Self::Hypervisor>;
}

/// An open connection through which domains and networks are managed.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    type Domain: Domain;
    type Network: Network;

    /// Locator this connection was opened with.
    fn uri(&self) -> &str;

    /// Register a domain from its definition document.
    async fn define_domain(&self, xml: &str) -> Result<Self::Domain>;

    /// Names of the active networks.
    async fn list_networks(&self) -> Result<Vec<String>>;

    /// Look up an existing network by name.
    async fn lookup_network(&self, name: &str) -> Result<Self::Network>;

    /// Create and start a transient network from its definition document.
    async fn create_network(&self, xml: &str) -> Result<Self::Network>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;
}

/// A defined domain.
#[async_trait]
pub trait Domain: Send + Sync {
    fn name(&self) -> &str;

    async fn is_active(&self) -> Result<bool>;

    /// Forcefully stop the domain.
    async fn destroy(&self) -> Result<()>;

    /// Remove the domain definition.
    async fn undefine(&self) -> Result<()>;

    /// Current definition document.
    async fn xml_desc(&self) -> Result<String>;
}

/// A virtual network.
#[async_trait]
pub trait Network: Send + Sync {
    fn name(&self) -> &str;

    /// Current definition document.
    async fn xml_desc(&self) -> Result<String>;

    /// Stop the network. Transient networks disappear with it.
    async fn destroy(&self) -> Result<()>;
}
