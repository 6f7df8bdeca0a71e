//! Hypervisor implementation driving the `virsh` command line client.
//!
//! Each call runs `virsh --connect <uri> <command>`; definition documents are
//! fed through stdin. A non-zero exit status becomes
//! [`DomainError::Operational`] carrying virsh's stderr.

use crate::document::Element;
use crate::error::{DomainError, Result};
use crate::hypervisor::{Connector, Domain, Hypervisor, Network};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default virsh binary, resolved through `PATH`.
pub const DEFAULT_VIRSH: &str = "virsh";

/// Opens [`VirshHypervisor`] connections.
#[derive(Debug, Clone)]
pub struct VirshConnector {
    binary: PathBuf,
}

impl Default for VirshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_VIRSH)
    }
}

impl VirshConnector {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Connector for VirshConnector {
    type Hypervisor = VirshHypervisor;

    async fn open(&self, uri: &str) -> Result<VirshHypervisor> {
        let virsh = Virsh {
            binary: self.binary.clone(),
            uri: uri.to_string(),
        };
        // Fails early if the daemon is unreachable for this URI.
        let canonical = virsh.run(&["uri"], None).await?;
        tracing::info!(uri = %uri, canonical = %canonical.trim(), "Hypervisor connection opened");
        Ok(VirshHypervisor { virsh })
    }
}

#[derive(Debug, Clone)]
struct Virsh {
    binary: PathBuf,
    uri: String,
}

impl Virsh {
    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let command = args.first().copied().unwrap_or_default();
        tracing::trace!(uri = %self.uri, args = ?args, "Running virsh");

        let mut child = Command::new(&self.binary)
            .arg("--connect")
            .arg(&self.uri)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DomainError::Operational(format!(
                    "failed to spawn {}: {e}",
                    self.binary.display()
                ))
            })?;

        // Feed stdin while stdout and stderr are drained, so neither side
        // blocks on a full pipe.
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input.as_bytes()).await?;
                // Dropping the pipe lets virsh see EOF.
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(command, status = %output.status, stderr = %stderr.trim(), "virsh failed");
            return Err(DomainError::Operational(format!(
                "virsh {command}: {}",
                stderr.trim()
            )));
        }
        fed.map_err(|e| DomainError::Operational(format!("virsh {command}: writing stdin: {e}")))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Connection to libvirt through `virsh`.
#[derive(Debug, Clone)]
pub struct VirshHypervisor {
    virsh: Virsh,
}

/// Domain handle backed by `virsh`.
#[derive(Debug, Clone)]
pub struct VirshDomain {
    name: String,
    virsh: Virsh,
}

/// Network handle backed by `virsh`.
#[derive(Debug, Clone)]
pub struct VirshNetwork {
    name: String,
    virsh: Virsh,
}

/// Name declared by a definition document.
fn declared_name(xml: &str) -> Result<String> {
    let root = Element::parse(xml)?;
    match root.find("name").map(Element::text) {
        Some(name) if !name.trim().is_empty() => Ok(name.trim().to_string()),
        _ => Err(DomainError::Definition(format!(
            "<{}> definition has no name",
            root.name()
        ))),
    }
}

/// Whether a `virsh domstate` answer describes a running domain.
pub fn state_is_active(domstate: &str) -> bool {
    !matches!(domstate.trim(), "" | "shut off" | "crashed")
}

/// Names printed by `virsh net-list --name`.
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    type Domain = VirshDomain;
    type Network = VirshNetwork;

    fn uri(&self) -> &str {
        &self.virsh.uri
    }

    async fn define_domain(&self, xml: &str) -> Result<VirshDomain> {
        let name = declared_name(xml)?;
        self.virsh.run(&["define", "/dev/stdin"], Some(xml)).await?;
        tracing::debug!(domain = %name, "Domain registered");
        Ok(VirshDomain {
            name,
            virsh: self.virsh.clone(),
        })
    }

    async fn list_networks(&self) -> Result<Vec<String>> {
        let output = self.virsh.run(&["net-list", "--name"], None).await?;
        Ok(parse_name_list(&output))
    }

    async fn lookup_network(&self, name: &str) -> Result<VirshNetwork> {
        self.virsh.run(&["net-info", name], None).await?;
        Ok(VirshNetwork {
            name: name.to_string(),
            virsh: self.virsh.clone(),
        })
    }

    async fn create_network(&self, xml: &str) -> Result<VirshNetwork> {
        let name = declared_name(xml)?;
        self.virsh
            .run(&["net-create", "/dev/stdin"], Some(xml))
            .await?;
        tracing::debug!(network = %name, "Network created");
        Ok(VirshNetwork {
            name,
            virsh: self.virsh.clone(),
        })
    }

    async fn close(&self) -> Result<()> {
        // virsh holds no connection between invocations.
        tracing::debug!(uri = %self.virsh.uri, "Hypervisor connection closed");
        Ok(())
    }
}

#[async_trait]
impl Domain for VirshDomain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_active(&self) -> Result<bool> {
        let state = self.virsh.run(&["domstate", &self.name], None).await?;
        Ok(state_is_active(&state))
    }

    async fn destroy(&self) -> Result<()> {
        self.virsh.run(&["destroy", &self.name], None).await?;
        Ok(())
    }

    async fn undefine(&self) -> Result<()> {
        self.virsh.run(&["undefine", &self.name], None).await?;
        Ok(())
    }

    async fn xml_desc(&self) -> Result<String> {
        self.virsh.run(&["dumpxml", &self.name], None).await
    }
}

#[async_trait]
impl Network for VirshNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    async fn xml_desc(&self) -> Result<String> {
        self.virsh.run(&["net-dumpxml", &self.name], None).await
    }

    async fn destroy(&self) -> Result<()> {
        self.virsh.run(&["net-destroy", &self.name], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_active() {
        assert!(state_is_active("running\n\n"));
        assert!(state_is_active("paused"));
        assert!(state_is_active("in shutdown"));
        assert!(!state_is_active("shut off\n"));
        assert!(!state_is_active("crashed"));
        assert!(!state_is_active(""));
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list("default\n kennel-1 \n\n"),
            ["default", "kennel-1"]
        );
        assert!(parse_name_list("\n").is_empty());
    }

    #[test]
    fn test_declared_name() {
        assert_eq!(
            declared_name("<domain><name> sbx </name></domain>").unwrap(),
            "sbx"
        );
        assert!(declared_name("<domain/>").is_err());
        assert!(declared_name("<network><name></name></network>").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_operational_error() {
        let connector = VirshConnector::new("/nonexistent/kennel-virsh");
        let err = connector.open("lxc:///").await.unwrap_err();
        assert!(err.is_operational());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_stdin_with_echoing_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("virsh");
        std::fs::write(&script, "#!/bin/sh\ncat\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let virsh = Virsh {
            binary: script,
            uri: "lxc:///".into(),
        };
        // Well past the size of a pipe buffer in both directions.
        let input = "<domain/>\n".repeat(256 * 1024);
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            virsh.run(&["define", "/dev/stdin"], Some(&input)),
        )
        .await
        .expect("virsh run stalled")
        .unwrap();
        assert_eq!(output.len(), input.len());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_operational_error() {
        let virsh = Virsh {
            binary: PathBuf::from("false"),
            uri: "lxc:///".into(),
        };
        let err = virsh.run(&["undefine", "foo"], None).await.unwrap_err();
        match err {
            DomainError::Operational(message) => assert!(message.starts_with("virsh undefine")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
