//! Virtual networks for sandboxes.
//!
//! A sandbox either joins an existing network (looked up by name, never
//! deleted) or gets a dedicated transient network synthesized from a base
//! `<network>` definition. Dedicated networks get a `virbr-<identity>`
//! bridge and, with address discovery on and no address pinned by the
//! definition, a free `192.168.X.0/24` subnet with a DHCP range.

use crate::config::NetworkConfig;
use crate::error::{CoreError, Result};
use kennel_domain::{expect_root, set_identity, Domain, Element, HostFs, Hypervisor, Network};
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Definition used when no network template is configured.
pub const DEFAULT_NETWORK_XML: &str = r#"<network><forward mode="nat"/></network>"#;

const NETMASK: &str = "255.255.255.0";
const DHCP_FIRST: u8 = 2;
const DHCP_LAST: u8 = 128;

/// Build the network definition for `identity` from the `base` template.
///
/// `name` and `uuid` are set to `identity` and the bridge to
/// `virbr-<identity>`, in place when already declared. With an `address`,
/// an `<ip>` block with a DHCP range is appended.
///
/// # Errors
/// [`CoreError::AddressConflict`] if `address` is given while the template
/// already declares an `<ip>` block.
pub fn network_xml(identity: &str, base: &str, address: Option<Ipv4Addr>) -> Result<String> {
    let mut network = Element::parse(base)?;
    expect_root(&network, "network")?;

    set_identity(&mut network, identity);
    network
        .find_or_append("bridge")
        .set_attr("name", format!("virbr-{identity}"));

    if let Some(address) = address {
        if network.find("ip").is_some() {
            return Err(CoreError::AddressConflict);
        }
        network.append(ip_block(address));
    }

    Ok(network.to_xml())
}

fn ip_block(address: Ipv4Addr) -> Element {
    let [a, b, c, _] = address.octets();
    let host = |last: u8| Ipv4Addr::new(a, b, c, last).to_string();
    Element::new("ip")
        .with_attr("address", address.to_string())
        .with_attr("netmask", NETMASK)
        .with_child(
            Element::new("dhcp").with_child(
                Element::new("range")
                    .with_attr("start", host(DHCP_FIRST))
                    .with_attr("end", host(DHCP_LAST)),
            ),
        )
}

/// Address of the first `<ip>` block of a network definition.
fn declared_address(xml: &str) -> Option<Ipv4Addr> {
    Element::parse(xml)
        .ok()?
        .find("ip")?
        .attr("address")?
        .parse()
        .ok()
}

/// Pick a random `192.168.X.1` address whose subnet no existing network uses.
///
/// Networks whose definition cannot be read or carries no address are
/// ignored.
pub async fn free_address<H: Hypervisor>(hypervisor: &H) -> Result<Ipv4Addr> {
    let mut used = BTreeSet::new();
    for name in hypervisor.list_networks().await? {
        let address = match hypervisor.lookup_network(&name).await {
            Ok(network) => network.xml_desc().await.ok(),
            Err(e) => {
                tracing::debug!(network = %name, error = %e, "Skipping unreadable network");
                None
            }
        };
        if let Some(address) = address.as_deref().and_then(declared_address) {
            used.insert(address.octets()[2]);
        }
    }

    let candidates: Vec<u8> = (1..=255).filter(|subnet| !used.contains(subnet)).collect();
    let subnet = candidates
        .choose(&mut rand::thread_rng())
        .copied()
        .ok_or(CoreError::NoFreeAddress)?;
    Ok(Ipv4Addr::new(192, 168, subnet, 1))
}

/// Look up an existing network by name.
pub async fn lookup<H: Hypervisor>(hypervisor: &H, name: &str) -> Result<H::Network> {
    tracing::debug!(network = %name, "Looking up network");
    Ok(hypervisor.lookup_network(name).await?)
}

/// Look up the network `domain` is attached to, if any.
pub async fn lookup_for_domain<H, D>(hypervisor: &H, domain: &D) -> Result<Option<H::Network>>
where
    H: Hypervisor,
    D: Domain,
{
    let xml = domain.xml_desc().await?;
    let root = Element::parse(&xml)?;
    let name = root
        .find("devices")
        .into_iter()
        .flat_map(Element::elements)
        .filter(|e| e.name() == "interface")
        .find_map(|iface| iface.find("source")?.attr("network"))
        .map(str::to_string);

    match name {
        Some(name) => Ok(Some(lookup(hypervisor, &name).await?)),
        None => Ok(None),
    }
}

/// Create a dedicated network for the sandbox `identity`.
///
/// A configured template is created in a single attempt unless address
/// discovery applies. Address discovery applies when it is enabled and the
/// template has no `<ip>`: a free subnet is picked for every attempt, as
/// another network may grab the same subnet in between. Without a template
/// the built-in definition is retried the same way, up to `max_attempts`.
pub async fn create<H, F>(
    hypervisor: &H,
    fs: &F,
    identity: &str,
    config: &NetworkConfig,
) -> Result<H::Network>
where
    H: Hypervisor,
    F: HostFs,
{
    let base = match &config.configuration {
        Some(path) => fs.read_to_string(path).await.map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?,
        None => DEFAULT_NETWORK_XML.to_string(),
    };

    let template = Element::parse(&base)?;
    let discover = config.ip_autodiscovery && template.find("ip").is_none();

    if !discover && config.configuration.is_some() {
        let xml = network_xml(identity, &base, None)?;
        let network = hypervisor
            .create_network(&xml)
            .await
            .map_err(|e| CoreError::NetworkCreation(e.to_string()))?;
        tracing::info!(sandbox_id = %identity, network = %network.name(), "Network created");
        return Ok(network);
    }

    for attempt in 1..=config.max_attempts {
        let address = if discover {
            Some(free_address(hypervisor).await?)
        } else {
            None
        };
        let xml = network_xml(identity, &base, address)?;
        match hypervisor.create_network(&xml).await {
            Ok(network) => {
                tracing::info!(
                    sandbox_id = %identity,
                    network = %network.name(),
                    address = ?address,
                    attempt,
                    "Network created"
                );
                return Ok(network);
            }
            Err(e) => {
                tracing::warn!(
                    sandbox_id = %identity,
                    address = ?address,
                    attempt,
                    error = %e,
                    "Network creation failed, retrying"
                );
            }
        }
    }
    Err(CoreError::TooManyAttempts(config.max_attempts))
}

/// Destroy a network created by [`create`].
pub async fn delete<N: Network>(network: &N) -> Result<()> {
    tracing::debug!(network = %network.name(), "Deleting network");
    network.destroy().await?;
    Ok(())
}
