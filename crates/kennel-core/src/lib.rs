//! # kennel-core
//!
//! Sandbox resource orchestration for kennel LXC sandboxes.
//!
//! A sandbox is a hypervisor connection, an optional virtual network and an
//! LXC domain with shared folders bind-mounted from the host. [`Resources`]
//! sets them up as one unit and releases them as one unit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    kennel-core (host)                    │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │   Resources     │────▶│  network                 │   │
//! │  │   - new()       │     │  - lookup() / create()   │   │
//! │  │   - cleanup()   │     │  - delete()              │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │           │                          │                   │
//! │           ▼                          ▼                   │
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │  kennel-domain                                   │   │
//! │  │  - domain_create() / domain_delete()             │   │
//! │  │  - domain_xml()                                  │   │
//! │  │  - Connector / Hypervisor / HostFs               │   │
//! │  └──────────────────────────────────────────────────┘   │
//! │                          │                               │
//! └──────────────────────────┼───────────────────────────────┘
//!                            ▼
//!                 libvirt (virsh, lxc:///)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use kennel_core::{Resources, ResourcesConfig, SandboxId};
//! use kennel_domain::{LocalFs, VirshConnector};
//!
//! # async fn example() -> kennel_core::Result<()> {
//! let config = ResourcesConfig::from_file("/etc/kennel/sandbox.json")?;
//!
//! let resources =
//!     Resources::new(&VirshConnector::default(), LocalFs, SandboxId::generate(), config).await?;
//! println!("domain {} is defined", resources.identity());
//!
//! // Release domain, owned network, shared folder and connection
//! resources.cleanup().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod network;
mod resources;

pub use config::{NetworkConfig, NetworkSetting, ResourcesConfig, DEFAULT_MAX_ATTEMPTS};
pub use error::{CoreError, Result};
pub use resources::{NetworkBinding, Resources, SandboxId};
