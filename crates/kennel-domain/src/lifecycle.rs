//! Domain creation and best-effort teardown.

use crate::config::{check_identity, DomainConfig};
use crate::error::{DomainError, Result};
use crate::fs::HostFs;
use crate::hypervisor::{Domain, Hypervisor};
use crate::merge::{domain_xml, Mount};
use std::path::Path;
use tracing::Instrument;

/// Define the sandbox domain `identity` on `hypervisor`.
///
/// This will:
/// 1. Read the base definition from `config.configuration`
/// 2. Create a per-sandbox host directory for every shared folder
/// 3. Patch the base definition with identity, mounts and network
/// 4. Register the result with the hypervisor
///
/// # Errors
/// [`DomainError::Definition`] if `identity` is not a single path component.
/// Nothing is rolled back: host directories created before a failing step
/// are left in place.
pub async fn domain_create<H, F>(
    hypervisor: &H,
    fs: &F,
    identity: &str,
    config: &DomainConfig,
    network_name: Option<&str>,
) -> Result<H::Domain>
where
    H: Hypervisor,
    F: HostFs,
{
    check_identity(identity)?;
    tracing::debug!(
        sandbox_id = %identity,
        configuration = %config.configuration.display(),
        "Reading domain configuration"
    );
    let base = fs
        .read_to_string(&config.configuration)
        .await
        .map_err(|e| DomainError::filesystem(&config.configuration, e))?;

    let mut mounts: Vec<Mount> = Vec::new();
    if let Some(filesystem) = &config.filesystem {
        for declared in filesystem.mounts() {
            let mount = declared.resolve(identity);
            tracing::trace!(
                sandbox_id = %identity,
                path = %mount.source.display(),
                "Creating shared folder"
            );
            fs.create_dir_all(&mount.source)
                .await
                .map_err(|e| DomainError::filesystem(&mount.source, e))?;
            mounts.push(mount);
        }
    }

    let xml = domain_xml(identity, &base, &mounts, network_name)?;
    tracing::trace!(sandbox_id = %identity, xml = %xml, "Domain definition");

    let domain = hypervisor.define_domain(&xml).await?;
    tracing::info!(
        sandbox_id = %identity,
        mounts = mounts.len(),
        network = network_name.unwrap_or("none"),
        "Domain defined"
    );
    Ok(domain)
}

/// Tear down `domain` and its shared folder.
///
/// Destroy (when active) and undefine are each attempted regardless of the
/// other's outcome; their failures are logged under `logger` and returned as
/// warnings. The shared folder at `mount_path`, if any and present, is
/// removed afterwards.
///
/// # Errors
/// Only a failure to remove an existing `mount_path` is returned as an error.
pub async fn domain_delete<D, F>(
    domain: &D,
    fs: &F,
    logger: &tracing::Span,
    mount_path: Option<&Path>,
) -> Result<Vec<DomainError>>
where
    D: Domain,
    F: HostFs,
{
    async move {
        let mut warnings = Vec::new();

        match domain.is_active().await {
            Ok(true) => {
                tracing::debug!(domain = %domain.name(), "Destroying active domain");
                if let Err(e) = domain.destroy().await {
                    tracing::error!(domain = %domain.name(), error = %e, "Failed to destroy domain");
                    warnings.push(e);
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(domain = %domain.name(), error = %e, "Failed to query domain state");
                warnings.push(e);
            }
        }

        if let Err(e) = domain.undefine().await {
            tracing::error!(domain = %domain.name(), error = %e, "Failed to undefine domain");
            warnings.push(e);
        }

        if let Some(path) = mount_path {
            if fs.exists(path).await {
                tracing::debug!(path = %path.display(), "Removing shared folder");
                fs.remove_dir_all(path)
                    .await
                    .map_err(|e| DomainError::filesystem(path, e))?;
            }
        }

        tracing::info!(
            domain = %domain.name(),
            warnings = warnings.len(),
            "Domain deleted"
        );
        Ok(warnings)
    }
    .instrument(logger.clone())
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountConfig;
    use crate::testing::{DomainState, FakeDomain, FakeHypervisor, MemoryFs};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    fn span() -> tracing::Span {
        tracing::info_span!("test")
    }

    fn fs_with_template() -> MemoryFs {
        MemoryFs::new().with_file("/foo", "<domain></domain>")
    }

    #[tokio::test]
    async fn test_create_no_filesystem() {
        let hypervisor = FakeHypervisor::new();
        let fs = fs_with_template();
        let domain = domain_create(&hypervisor, &fs, "foo", &DomainConfig::new("/foo"), None)
            .await
            .unwrap();

        assert_eq!(domain.name(), "foo");
        assert_eq!(
            hypervisor.defined(),
            ["<domain><name>foo</name><uuid>foo</uuid><devices /></domain>"]
        );
        assert!(fs.created().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_escaping_identity() {
        let config = DomainConfig::new("/foo").with_filesystem(MountConfig::new("/srv", "/mnt"));

        for identity in ["/", "..", "a/b"] {
            let hypervisor = FakeHypervisor::new();
            let fs = fs_with_template().with_dir("/");
            let err = domain_create(&hypervisor, &fs, identity, &config, None)
                .await
                .unwrap_err();

            assert!(matches!(err, DomainError::Definition(_)));
            assert!(fs.created().is_empty());
            assert!(hypervisor.defined().is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_single_filesystem() {
        let hypervisor = FakeHypervisor::new();
        let fs = fs_with_template();
        let config = DomainConfig::new("/foo").with_filesystem(MountConfig::new("/bar", "/baz"));

        domain_create(&hypervisor, &fs, "foo", &config, None)
            .await
            .unwrap();

        assert_eq!(
            hypervisor.defined(),
            ["<domain><name>foo</name><uuid>foo</uuid><devices><filesystem type=\"mount\">\
              <source dir=\"/bar/foo\" /><target dir=\"/baz\" /></filesystem></devices></domain>"]
        );
        assert_eq!(fs.created(), [PathBuf::from("/bar/foo")]);
    }

    #[tokio::test]
    async fn test_create_multiple_filesystems() {
        let hypervisor = FakeHypervisor::new();
        let fs = fs_with_template();
        let config = DomainConfig::new("/foo").with_filesystem(vec![
            MountConfig::new("/bar", "/baz"),
            MountConfig::new("/dead", "/beef"),
        ]);

        domain_create(&hypervisor, &fs, "foo", &config, None)
            .await
            .unwrap();

        assert_eq!(
            hypervisor.defined(),
            ["<domain><name>foo</name><uuid>foo</uuid><devices><filesystem type=\"mount\">\
              <source dir=\"/bar/foo\" /><target dir=\"/baz\" /></filesystem><filesystem type=\"mount\">\
              <source dir=\"/dead/foo\" /><target dir=\"/beef\" /></filesystem></devices></domain>"]
        );
        assert_eq!(
            fs.created(),
            [PathBuf::from("/bar/foo"), PathBuf::from("/dead/foo")]
        );
    }

    #[tokio::test]
    async fn test_create_with_network() {
        let hypervisor = FakeHypervisor::new();
        let fs = fs_with_template();
        let config = DomainConfig::new("/foo").with_filesystem(MountConfig::new("/bar", "/baz"));

        domain_create(&hypervisor, &fs, "foo", &config, Some("foo"))
            .await
            .unwrap();

        assert_eq!(
            hypervisor.defined(),
            ["<domain><name>foo</name><uuid>foo</uuid><devices><filesystem type=\"mount\">\
              <source dir=\"/bar/foo\" /><target dir=\"/baz\" /></filesystem><interface type=\"network\">\
              <source network=\"foo\" /></interface></devices></domain>"]
        );
    }

    #[tokio::test]
    async fn test_create_missing_configuration() {
        let hypervisor = FakeHypervisor::new();
        let err = domain_create(
            &hypervisor,
            &MemoryFs::new(),
            "foo",
            &DomainConfig::new("/missing"),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DomainError::Filesystem { ref path, .. } if path == Path::new("/missing")));
        assert!(hypervisor.defined().is_empty());
    }

    #[tokio::test]
    async fn test_create_malformed_configuration() {
        let hypervisor = FakeHypervisor::new();
        let fs = MemoryFs::new().with_file("/foo", "<domain>");
        let err = domain_create(&hypervisor, &fs, "foo", &DomainConfig::new("/foo"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Definition(_)));
        assert!(hypervisor.defined().is_empty());
    }

    #[tokio::test]
    async fn test_create_define_failure_propagates() {
        let hypervisor = FakeHypervisor::new().failing_define();
        let fs = fs_with_template();
        let config = DomainConfig::new("/foo").with_filesystem(MountConfig::new("/bar", "/baz"));

        let err = domain_create(&hypervisor, &fs, "foo", &config, None)
            .await
            .unwrap_err();

        assert!(err.is_operational());
        // Shared folders are not rolled back.
        assert_eq!(fs.created(), [PathBuf::from("/bar/foo")]);
    }

    #[tokio::test]
    async fn test_delete_destroys_active_domain() {
        let domain = FakeDomain::new("foo", "<domain/>", DomainState::active());
        let warnings = domain_delete(&domain, &MemoryFs::new(), &span(), None)
            .await
            .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(domain.state().destroy_calls(), 1);
        assert_eq!(domain.state().undefine_calls(), 1);
        assert_eq!(
            domain.log().calls(),
            ["domain.is_active", "domain.destroy", "domain.undefine"]
        );
    }

    #[tokio::test]
    async fn test_delete_destroy_error_still_undefines() {
        let state = DomainState::active();
        state.fail_destroy.store(true, Ordering::SeqCst);
        let domain = FakeDomain::new("foo", "<domain/>", state);

        let warnings = domain_delete(&domain, &MemoryFs::new(), &span(), None)
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].is_operational());
        assert_eq!(domain.state().undefine_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_inactive_domain_only_undefines() {
        let domain = FakeDomain::new("foo", "<domain/>", DomainState::inactive());
        domain_delete(&domain, &MemoryFs::new(), &span(), None)
            .await
            .unwrap();

        assert_eq!(domain.state().destroy_calls(), 0);
        assert_eq!(domain.state().undefine_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_state_query_error_still_undefines() {
        let state = DomainState::active();
        state.fail_is_active.store(true, Ordering::SeqCst);
        let domain = FakeDomain::new("foo", "<domain/>", state);

        let warnings = domain_delete(&domain, &MemoryFs::new(), &span(), None)
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(domain.state().destroy_calls(), 0);
        assert_eq!(domain.state().undefine_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_undefine_error_still_cleans_filesystem() {
        let state = DomainState::inactive();
        state.fail_undefine.store(true, Ordering::SeqCst);
        let domain = FakeDomain::new("foo", "<domain/>", state);
        let fs = MemoryFs::new().with_dir("/foo/bar/baz");

        let warnings = domain_delete(&domain, &fs, &span(), Some(Path::new("/foo/bar/baz")))
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(fs.removed(), [PathBuf::from("/foo/bar/baz")]);
    }

    #[tokio::test]
    async fn test_delete_both_errors_collected() {
        let state = DomainState::active();
        state.fail_destroy.store(true, Ordering::SeqCst);
        state.fail_undefine.store(true, Ordering::SeqCst);
        let domain = FakeDomain::new("foo", "<domain/>", state);

        let warnings = domain_delete(&domain, &MemoryFs::new(), &span(), None)
            .await
            .unwrap();

        assert_eq!(warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_existing_mount_once() {
        let domain = FakeDomain::new("foo", "<domain/>", DomainState::inactive());
        let fs = MemoryFs::new().with_dir("foo/bar/baz");

        domain_delete(&domain, &fs, &span(), Some(Path::new("foo/bar/baz")))
            .await
            .unwrap();

        assert_eq!(fs.removed(), [PathBuf::from("foo/bar/baz")]);
    }

    #[tokio::test]
    async fn test_delete_skips_missing_mount() {
        let domain = FakeDomain::new("foo", "<domain/>", DomainState::inactive());
        let fs = MemoryFs::new();

        domain_delete(&domain, &fs, &span(), Some(Path::new("/foo/bar/baz")))
            .await
            .unwrap();

        assert!(fs.removed().is_empty());
    }

    #[tokio::test]
    async fn test_delete_remove_failure_propagates() {
        let domain = FakeDomain::new("foo", "<domain/>", DomainState::active());
        let fs = MemoryFs::new().with_dir("/foo").failing_remove();

        let err = domain_delete(&domain, &fs, &span(), Some(Path::new("/foo")))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Filesystem { .. }));
        // The domain was handled before the filesystem step.
        assert_eq!(domain.state().undefine_calls(), 1);
    }
}
