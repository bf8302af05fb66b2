//! Storage disks that hold backup artifacts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use keeper_common::error::AppError;

use crate::error::BackupError;

#[async_trait]
pub trait Disk: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, AppError>;

    /// Size in bytes of the file at `path`.
    async fn size(&self, path: &str) -> Result<u64, AppError>;

    /// Remove the file at `path`. Returns false if it was already gone.
    async fn delete(&self, path: &str) -> Result<bool, AppError>;
}

/// A directory on the local filesystem.
pub struct LocalDisk {
    root: PathBuf,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a disk-relative path, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AppError::Storage(format!("Invalid disk path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Disk for LocalDisk {
    async fn exists(&self, path: &str) -> Result<bool, AppError> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| AppError::Storage(format!("{}: {}", full.display(), e)))
    }

    async fn size(&self, path: &str) -> Result<u64, AppError> {
        let full = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| AppError::Storage(format!("{}: {}", full.display(), e)))?;
        Ok(metadata.len())
    }

    async fn delete(&self, path: &str) -> Result<bool, AppError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!("{}: {}", full.display(), e))),
        }
    }
}

/// Disks by name, as referenced from `backups.disk`.
#[derive(Clone, Default)]
pub struct DiskRegistry {
    disks: HashMap<String, Arc<dyn Disk>>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(mut self, name: impl Into<String>, disk: Arc<dyn Disk>) -> Self {
        self.disks.insert(name.into(), disk);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Disk>, BackupError> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| BackupError::UnknownDisk(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("keeper")).unwrap();
        std::fs::write(dir.path().join("keeper/a.zip"), vec![0u8; 2048]).unwrap();
        let disk = LocalDisk::new(dir.path());

        assert!(disk.exists("keeper/a.zip").await.unwrap());
        assert_eq!(disk.size("keeper/a.zip").await.unwrap(), 2048);
        assert!(disk.delete("keeper/a.zip").await.unwrap());
        assert!(!disk.exists("keeper/a.zip").await.unwrap());
        assert!(!disk.delete("keeper/a.zip").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_disk_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let disk = LocalDisk::new(dir.path());

        assert!(disk.exists("../etc/passwd").await.is_err());
        assert!(disk.delete("/etc/passwd").await.is_err());
    }

    #[test]
    fn test_registry_unknown_disk() {
        let registry = DiskRegistry::new();
        assert!(matches!(
            registry.get("s3"),
            Err(BackupError::UnknownDisk(name)) if name == "s3"
        ));
    }
}
