//! Blob storage for uploaded receipts.
//!
//! Blobs are addressed by a relative path `{bucket}/{key}`. The filesystem
//! backend lays them out under a base directory with the same structure.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use tally_core::{Error, Result};

/// Storage backend trait for pluggable blob storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path, replacing any existing blob.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Missing blobs are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Reject absolute paths and any `..`/root components.
pub fn validate_blob_path(path: &str) -> Result<&Path> {
    let p = Path::new(path);
    if path.is_empty() {
        return Err(Error::InvalidInput("storage path is empty".to_string()));
    }
    let safe = p.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(Error::InvalidInput(format!(
            "storage path '{}' must be relative without '..'",
            path
        )));
    }
    Ok(p)
}

/// Filesystem storage backend.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        Ok(self.base_path.join(validate_blob_path(path)?))
    }

    /// Write, read back, and delete a probe file so permission problems
    /// surface at startup instead of on the first upload.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let probe_dir = self.base_path.join(".health-check");
        let probe = probe_dir.join("probe.bin");
        let data = b"storage-health-check";

        fs::create_dir_all(&probe_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", probe_dir, e))?;
        fs::write(&probe, data)
            .await
            .map_err(|e| format!("write({:?}): {}", probe, e))?;
        let read_back = fs::read(&probe)
            .await
            .map_err(|e| format!("read({:?}): {}", probe, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }
        fs::remove_file(&probe)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", probe, e))?;
        let _ = fs::remove_dir(&probe_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            subsystem = "storage",
            op = "write",
            storage_path = %path,
            size = data.len(),
            "Writing blob"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(subsystem = "storage", parent = %parent.display(), error = %e, "create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(subsystem = "storage", to = %full_path.display(), error = %e, "rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", path)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        backend
            .write("receipts/u1/1700000000000-a.png", b"png-bytes")
            .await
            .unwrap();
        assert!(backend.exists("receipts/u1/1700000000000-a.png").await.unwrap());
        assert_eq!(
            backend.read("receipts/u1/1700000000000-a.png").await.unwrap(),
            b"png-bytes"
        );

        backend.delete("receipts/u1/1700000000000-a.png").await.unwrap();
        assert!(!backend.exists("receipts/u1/1700000000000-a.png").await.unwrap());
        // Deleting twice is fine
        backend.delete("receipts/u1/1700000000000-a.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.read("receipts/nope.bin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.write("b/k", b"one").await.unwrap();
        backend.write("b/k", b"two").await.unwrap();
        assert_eq!(backend.read("b/k").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_validate_probe() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        assert!(backend.validate().await.is_ok());
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(validate_blob_path("../etc/passwd").is_err());
        assert!(validate_blob_path("receipts/../../x").is_err());
        assert!(validate_blob_path("/abs/path").is_err());
        assert!(validate_blob_path("").is_err());
        assert!(validate_blob_path("receipts/u/x.png").is_ok());
    }
}
