//! Domain definition synthesis.
//!
//! Patches a base `<domain>` template with the sandbox identity, its shared
//! folders and its network attachment.

use crate::document::Element;
use crate::error::{DomainError, Result};
use std::path::PathBuf;

/// A host directory exposed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Directory on the host.
    pub source: PathBuf,
    /// Mount point inside the sandbox.
    pub target: PathBuf,
}

impl Mount {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Build the domain definition for `identity` from the `base` template.
///
/// `name` and `uuid` are rewritten in place or appended; each mount is
/// appended as a new `<filesystem type="mount">` device, and the network
/// attachment rewrites an existing `<interface type="network">` rather than
/// adding a second one.
///
/// # Errors
/// Returns [`DomainError::Definition`] if `base` is not a `<domain>` document.
pub fn domain_xml(
    identity: &str,
    base: &str,
    mounts: &[Mount],
    network_name: Option<&str>,
) -> Result<String> {
    let mut domain = Element::parse(base)?;
    expect_root(&domain, "domain")?;

    set_identity(&mut domain, identity);

    let devices = domain.find_or_append("devices");
    for mount in mounts {
        devices.append(filesystem_device(mount));
    }

    if let Some(network) = network_name.filter(|name| !name.is_empty()) {
        let existing = devices
            .elements_mut()
            .find(|e| e.name() == "interface" && e.attr("type") == Some("network"));
        match existing {
            Some(interface) => interface
                .find_or_append("source")
                .set_attr("network", network),
            None => devices.append(
                Element::new("interface")
                    .with_attr("type", "network")
                    .with_child(Element::new("source").with_attr("network", network)),
            ),
        }
    }

    Ok(domain.to_xml())
}

/// Set `<name>` and `<uuid>` of a definition root to `identity`.
pub fn set_identity(root: &mut Element, identity: &str) {
    root.find_or_append("name").set_text(identity);
    root.find_or_append("uuid").set_text(identity);
}

/// Fail unless `root` carries the expected tag.
pub fn expect_root(root: &Element, name: &str) -> Result<()> {
    if root.name() != name {
        return Err(DomainError::Definition(format!(
            "expected <{}> root element, found <{}>",
            name,
            root.name()
        )));
    }
    Ok(())
}

fn filesystem_device(mount: &Mount) -> Element {
    Element::new("filesystem")
        .with_attr("type", "mount")
        .with_child(Element::new("source").with_attr("dir", mount.source.to_string_lossy()))
        .with_child(Element::new("target").with_attr("dir", mount.target.to_string_lossy()))
}
