//! # Blob Storage
//!
//! Attachment bytes live outside the database. The store hands back a url
//! on upload, and the same url is what it takes to delete.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob storage is not configured")]
    NotConfigured,

    #[error("Invalid blob url: {0}")]
    InvalidUrl(String),

    #[error("Blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        UploadedFile {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores the file and returns its url.
    async fn upload(&self, file: &UploadedFile) -> Result<String, StorageError>;

    /// Removes the blob behind `url`. Deleting a missing blob succeeds.
    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

/// Refuses every upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredStorage;

#[async_trait]
impl BlobStorage for UnconfiguredStorage {
    async fn upload(&self, _file: &UploadedFile) -> Result<String, StorageError> {
        Err(StorageError::NotConfigured)
    }

    async fn delete(&self, _url: &str) -> Result<(), StorageError> {
        Err(StorageError::NotConfigured)
    }
}

// =============================================================================
// Local Filesystem
// =============================================================================

/// Stores blobs as files under one directory and addresses them with
/// `file://` urls.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    base_path: PathBuf,
}

impl LocalBlobStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        // file urls need an absolute path
        let base_path = fs::canonicalize(&base_path).await?;
        Ok(LocalBlobStorage { base_path })
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, StorageError> {
        let parsed = Url::parse(url).map_err(|e| StorageError::InvalidUrl(format!("{url}: {e}")))?;
        let path = parsed
            .to_file_path()
            .map_err(|_| StorageError::InvalidUrl(url.to_string()))?;

        if path.parent() != Some(self.base_path.as_path()) {
            return Err(StorageError::InvalidUrl(format!("{url} is outside the blob directory")));
        }
        Ok(path)
    }
}

/// Keeps letters, digits, dots, dashes and underscores.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, file: &UploadedFile) -> Result<String, StorageError> {
        let key = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&file.file_name));
        let path = self.base_path.join(key);

        fs::write(&path, &file.bytes).await?;
        debug!(path = %path.display(), size = file.bytes.len(), "Blob stored");

        Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| StorageError::InvalidUrl(path.display().to_string()))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.path_for(url)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("foto antes.jpg"), "foto_antes.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[tokio::test]
    async fn test_local_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path().join("blobs")).await.unwrap();

        let url = storage
            .upload(&UploadedFile::new("laudo.pdf", "application/pdf", b"%PDF-1.4".to_vec()))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("-laudo.pdf"));

        let path = Url::parse(&url).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        storage.delete(&url).await.unwrap();
        assert!(!path.exists());
        // second delete is a no-op
        storage.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_outside_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path()).await.unwrap();

        let err = storage.delete("file:///etc/hosts").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl(_)));
        assert!(storage.delete("not a url").await.is_err());
    }
}
