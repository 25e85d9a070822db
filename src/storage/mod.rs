//! Storage abstraction with pluggable backends.
//!
//! Supports:
//! - `local`: bare paths and `file://` URLs
//! - `gcs`: `gs://bucket/object` URLs via the GCS JSON API
//!
//! Folder outputs written by the table engine are only complete once the `_SUCCESS`
//! marker inside them exists. Directory existence and marker existence are separate
//! checks on purpose: a folder can exist while the engine is still writing into it.

mod error;
mod gcs;
mod local;

pub use error::{classify_http_status, StorageError, StorageErrorKind};
pub use gcs::{parse_gcs_path, GcsStorage};
pub use local::{local_path, LocalStorage};

use std::sync::Arc;

use async_trait::async_trait;

/// Name of the completion marker inside folder outputs.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Storage backend trait - implemented by all backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a file/object exists at `path`. Absence is `Ok(false)`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Whether `path` exists as a folder (has at least one entry beneath it).
    async fn dir_exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Write `data` to `path` so that readers see either nothing or the whole content.
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// Dispatches each path to the backend owning its scheme.
#[derive(Clone)]
pub struct StorageRouter {
    local: Arc<dyn StorageBackend>,
    gcs: Option<Arc<dyn StorageBackend>>,
}

impl StorageRouter {
    pub fn new(local: Arc<dyn StorageBackend>, gcs: Option<Arc<dyn StorageBackend>>) -> Self {
        Self { local, gcs }
    }

    /// Local filesystem only.
    pub fn local_only() -> Self {
        Self::new(Arc::new(LocalStorage::new()), None)
    }

    pub fn backend_for(&self, path: &str) -> Result<&dyn StorageBackend, StorageError> {
        if path.starts_with("gs://") {
            return self
                .gcs
                .as_deref()
                .ok_or_else(|| StorageError::not_configured(path, "GCS"));
        }
        match path.split_once("://") {
            None => Ok(self.local.as_ref()),
            Some(("file", _)) => Ok(self.local.as_ref()),
            Some(_) => Err(StorageError::unsupported_scheme(path)),
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.backend_for(path)?.exists(path).await
    }

    pub async fn dir_exists(&self, path: &str) -> Result<bool, StorageError> {
        self.backend_for(path)?.dir_exists(path).await
    }

    pub async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.backend_for(path)?.write(path, data).await
    }
}

/// Join a child name onto a storage path regardless of scheme.
pub fn join_path(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child)
}

/// Output location of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single file whose presence is its completeness (source inputs)
    File(String),
    /// A folder written by the table engine, complete only with its marker
    Folder(String),
}

impl Target {
    pub fn path(&self) -> &str {
        match self {
            Self::File(path) | Self::Folder(path) => path,
        }
    }

    /// Whether anything exists at the target path. Says nothing about completeness.
    pub async fn path_exists(&self, storage: &StorageRouter) -> Result<bool, StorageError> {
        match self {
            Self::File(path) => storage.exists(path).await,
            Self::Folder(path) => storage.dir_exists(path).await,
        }
    }

    /// Whether the folder's completion marker exists. Files carry no marker.
    pub async fn marker_exists(&self, storage: &StorageRouter) -> Result<bool, StorageError> {
        match self {
            Self::File(_) => Ok(false),
            Self::Folder(path) => storage.exists(&join_path(path, SUCCESS_MARKER)).await,
        }
    }

    pub async fn is_complete(&self, storage: &StorageRouter) -> Result<bool, StorageError> {
        match self {
            Self::File(_) => self.path_exists(storage).await,
            Self::Folder(_) => {
                Ok(self.path_exists(storage).await? && self.marker_exists(storage).await?)
            }
        }
    }

    /// Publish the completion marker for a folder target.
    pub async fn mark_complete(&self, storage: &StorageRouter) -> Result<(), StorageError> {
        match self {
            Self::File(_) => Ok(()),
            Self::Folder(path) => storage.write(&join_path(path, SUCCESS_MARKER), b"").await,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_scheme() {
        let router = StorageRouter::local_only();
        assert_eq!(router.backend_for("/data/callset.vcf").unwrap().name(), "local");
        assert_eq!(router.backend_for("file:///data/x").unwrap().name(), "local");

        let err = router.backend_for("gs://bucket/x").err().unwrap();
        assert_eq!(err.kind, StorageErrorKind::NotConfigured);

        let err = router.backend_for("s3://bucket/x").err().unwrap();
        assert_eq!(err.kind, StorageErrorKind::UnsupportedScheme);

        let with_gcs = StorageRouter::new(
            Arc::new(LocalStorage::new()),
            Some(Arc::new(GcsStorage::new("token"))),
        );
        assert_eq!(with_gcs.backend_for("gs://bucket/x").unwrap().name(), "gcs");
    }

    #[tokio::test]
    async fn folder_without_marker_is_not_complete() {
        let temp = tempfile::tempdir().expect("tempdir");
        let storage = StorageRouter::local_only();
        let folder = temp.path().join("imported.mt").to_string_lossy().to_string();
        let target = Target::Folder(folder.clone());

        assert!(!target.is_complete(&storage).await.unwrap());

        // A half-written folder exists but is not complete.
        storage
            .write(&join_path(&folder, "rows/part-0"), b"partial")
            .await
            .unwrap();
        assert!(target.path_exists(&storage).await.unwrap());
        assert!(!target.marker_exists(&storage).await.unwrap());
        assert!(!target.is_complete(&storage).await.unwrap());

        target.mark_complete(&storage).await.unwrap();
        assert!(target.is_complete(&storage).await.unwrap());
    }

    #[tokio::test]
    async fn file_target_is_complete_when_present() {
        let temp = tempfile::tempdir().expect("tempdir");
        let storage = StorageRouter::local_only();
        let path = temp.path().join("callset.vcf").to_string_lossy().to_string();
        let target = Target::File(path.clone());

        assert!(!target.is_complete(&storage).await.unwrap());
        storage.write(&path, b"#CHROM\n").await.unwrap();
        assert!(target.is_complete(&storage).await.unwrap());
    }
}
