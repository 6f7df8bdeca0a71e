//! Host filesystem primitives used for templates and shared folders.

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Filesystem operations the lifecycle code needs on the host.
#[async_trait]
pub trait HostFs: Send + Sync {
    /// Read a whole file as UTF-8.
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Create a directory and its parents. Succeeds if it already exists.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// Remove a directory tree.
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`HostFs`] backed by the local filesystem through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl HostFs for LocalFs {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_dir_all(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_fs_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("shared").join("sbx");
        let fs = LocalFs;

        assert!(!fs.exists(&dir).await);
        fs.create_dir_all(&dir).await.unwrap();
        fs.create_dir_all(&dir).await.unwrap();
        assert!(fs.exists(&dir).await);

        let file = dir.join("domain.xml");
        tokio::fs::write(&file, "<domain/>").await.unwrap();
        assert_eq!(fs.read_to_string(&file).await.unwrap(), "<domain/>");

        fs.remove_dir_all(&dir).await.unwrap();
        assert!(!fs.exists(&dir).await);
        assert!(fs.remove_dir_all(&dir).await.is_err());
    }
}
