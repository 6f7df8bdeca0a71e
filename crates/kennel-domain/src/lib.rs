//! # kennel-domain
//!
//! LXC domain management layer for kennel sandboxes.
//!
//! Synthesizes domain definitions from a base template and manages the
//! domain's lifecycle through a hypervisor connection.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kennel_domain::{domain_create, domain_delete, Connector, DomainConfig, LocalFs, MountConfig, VirshConnector};
//!
//! # async fn example() -> kennel_domain::Result<()> {
//! let hypervisor = VirshConnector::default().open("lxc:///").await?;
//! let config = DomainConfig::new("/etc/kennel/domain.xml")
//!     .with_filesystem(MountConfig::new("/srv/kennel", "/mnt/shared"));
//!
//! // Defines <domain> "sbx-1" with /srv/kennel/sbx-1 mounted at /mnt/shared
//! let domain = domain_create(&hypervisor, &LocalFs, "sbx-1", &config, None).await?;
//!
//! // Best-effort teardown: failures are logged and returned as warnings
//! let span = tracing::info_span!("teardown");
//! let warnings = domain_delete(&domain, &LocalFs, &span, Some(std::path::Path::new("/srv/kennel/sbx-1"))).await?;
//! assert!(warnings.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Definition Synthesis**: Patch `name`/`uuid`, shared folders and network into a template
//! - **Lifecycle Management**: Define, destroy and undefine domains
//! - **Failure-Tolerant Teardown**: Each teardown step runs regardless of earlier failures
//! - **Pluggable Backends**: `virsh` in production, in-memory doubles behind the `testing` feature

mod config;
mod document;
mod error;
mod fs;
mod hypervisor;
mod lifecycle;
mod merge;
mod virsh;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{check_identity, DomainConfig, FilesystemSpec, MountConfig};
pub use document::{Element, Node};
pub use error::{DomainError, Result};
pub use fs::{HostFs, LocalFs};
pub use hypervisor::{Connector, Domain, Hypervisor, Network, DEFAULT_HYPERVISOR};
pub use lifecycle::{domain_create, domain_delete};
pub use merge::{domain_xml, expect_root, set_identity, Mount};
pub use virsh::{VirshConnector, VirshDomain, VirshHypervisor, VirshNetwork, DEFAULT_VIRSH};
