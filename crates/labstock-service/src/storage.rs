//! # File Storage Sink
//!
//! Proof-of-request documents and component images. The core only ever
//! sees the public URL string.
//!
//! ```text
//! Upload { "practica.pdf", bytes }
//!      │ store
//!      ▼
//! {upload_dir}/3f2c...e1.pdf   ──►  "/uploads/3f2c...e1.pdf"
//! ```
//!
//! Stored names are random UUIDs; the client's name contributes only its
//! extension.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 10;

/// A file received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Empty upload")]
    Empty,

    #[error("URL is not managed by this store: {0}")]
    ForeignUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores and removes uploaded files.
pub trait FileStore: Send + Sync {
    /// Writes the upload and returns its public URL.
    fn store(&self, upload: Upload) -> impl Future<Output = Result<String, StorageError>> + Send;

    /// Removes a file by the URL `store` returned. Missing files are not an
    /// error.
    fn delete(&self, url: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Files on the local disk, served under a URL prefix.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        LocalFileStore {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, StorageError> {
        let name = url
            .strip_prefix(&self.public_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| is_stored_name(name))
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
        Ok(self.root.join(name))
    }
}

impl FileStore for LocalFileStore {
    async fn store(&self, upload: Upload) -> Result<String, StorageError> {
        if upload.bytes.is_empty() {
            return Err(StorageError::Empty);
        }

        let name = stored_name(&upload.file_name);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&name), &upload.bytes).await?;

        debug!(file = %name, size = upload.bytes.len(), "Upload stored");
        Ok(format!("{}/{}", self.public_prefix, name))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.path_for(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(?path, "Upload removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn stored_name(original: &str) -> String {
    let extension = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

/// Only names this store generated: no separators, no parent references.
fn is_stored_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalFileStore {
        let root = std::env::temp_dir().join(format!("labstock-test-{}", Uuid::new_v4()));
        LocalFileStore::new(root, "/uploads/")
    }

    #[test]
    fn test_stored_name_keeps_safe_extension_only() {
        assert!(stored_name("practica.PDF").ends_with(".pdf"));
        assert!(!stored_name("../../etc/passwd").contains('/'));
        assert!(!stored_name("photo.j p g").contains(' '));
    }

    #[tokio::test]
    async fn test_store_then_delete() {
        let store = temp_store();
        let url = store
            .store(Upload {
                file_name: "proof.pdf".to_string(),
                bytes: b"%PDF-1.7".to_vec(),
            })
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/"));

        let path = store.path_for(&url).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.7");

        store.delete(&url).await.unwrap();
        assert!(!path.exists());
        // Second delete is a no-op.
        store.delete(&url).await.unwrap();

        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_rejects_empty_and_foreign() {
        let store = temp_store();
        assert!(matches!(
            store
                .store(Upload {
                    file_name: "empty.txt".to_string(),
                    bytes: Vec::new(),
                })
                .await,
            Err(StorageError::Empty)
        ));
        assert!(matches!(
            store.delete("/uploads/../labstock.db").await,
            Err(StorageError::ForeignUrl(_))
        ));
        assert!(matches!(
            store.delete("https://elsewhere.example/x.png").await,
            Err(StorageError::ForeignUrl(_))
        ));
    }
}
