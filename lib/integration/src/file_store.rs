//! Uploaded file access.

use crate::error::FileStoreError;
use async_trait::async_trait;
use loomwork_core::FileId;
use std::path::PathBuf;
use tracing::debug;

/// Where a stored file lives and what kind it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Storage path passed back to [`FileStore::download`].
    pub path: String,
    /// Lowercase extension without the dot, e.g. `png`.
    pub extension: String,
}

/// Storage for uploaded files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Looks up a file by id.
    async fn metadata(&self, file_id: FileId) -> Result<FileMetadata, FileStoreError>;

    /// Reads the bytes stored at `path`.
    async fn download(&self, path: &str) -> Result<Vec<u8>, FileStoreError>;
}

/// Files kept on local disk as `<root>/<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn metadata(&self, file_id: FileId) -> Result<FileMetadata, FileStoreError> {
        let stem = file_id.to_string();
        let read_failed = |e: std::io::Error| FileStoreError::ReadFailed {
            path: self.root.display().to_string(),
            reason: e.to_string(),
        };

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(read_failed)?;
        while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) != Some(stem.as_str()) {
                continue;
            }
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            debug!(file_id = %file_id, path = %path.display(), "resolved file");
            return Ok(FileMetadata {
                path: path.display().to_string(),
                extension,
            });
        }

        Err(FileStoreError::NotFound { file_id: stem })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FileStoreError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FileStoreError::ReadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}
