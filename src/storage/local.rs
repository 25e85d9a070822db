//! Local filesystem backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{StorageBackend, StorageError};

/// Strip an optional `file://` prefix.
pub fn local_path(path: &str) -> PathBuf {
    PathBuf::from(path.strip_prefix("file://").unwrap_or(path))
}

#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }

    async fn metadata(path: &str) -> Result<Option<std::fs::Metadata>, StorageError> {
        match fs::metadata(local_path(path)).await {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(Self::metadata(path).await?.is_some())
    }

    async fn dir_exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(Self::metadata(path)
            .await?
            .map(|meta| meta.is_dir())
            .unwrap_or(false))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let target = local_path(path);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(path, e))?;
        }
        let tmp = tmp_sibling(&target);
        fs::write(&tmp, data)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        fs::rename(&tmp, &target)
            .await
            .map_err(|e| StorageError::io(path, e))
    }
}

fn tmp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinguishes_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new();
        let dir = temp.path().join("table.ht");
        let dir_str = dir.to_string_lossy().to_string();

        assert!(!storage.exists(&dir_str).await.unwrap());
        assert!(!storage.dir_exists(&dir_str).await.unwrap());

        let marker = format!("{}/_SUCCESS", dir_str);
        storage.write(&marker, b"").await.unwrap();

        assert!(storage.dir_exists(&dir_str).await.unwrap());
        assert!(storage.exists(&marker).await.unwrap());
        assert!(!storage.dir_exists(&marker).await.unwrap());
    }

    #[tokio::test]
    async fn accepts_file_scheme() {
        let temp = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new();
        let path = format!("file://{}/callset.vcf", temp.path().display());
        storage.write(&path, b"##fileformat=VCFv4.2\n").await.unwrap();
        assert!(storage.exists(&path).await.unwrap());
    }
}
