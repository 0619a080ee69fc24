//! Boundary to the encrypted local blob storage.
//!
//! The sync engine ships ciphertext as-is: content is encrypted at rest
//! by the vault, and upload never decrypts. This module only locates the
//! encrypted bytes and reports their length.

use crate::error::{SyncResult, UploadError};
use async_trait::async_trait;
use obscura_types::FileId;
use std::path::PathBuf;

/// An already-encrypted blob ready to stream to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub path: PathBuf,
    pub len: u64,
    /// Opaque name used as the final object-key segment. Randomly
    /// generated at capture time; never the user's filename.
    pub blob_name: String,
}

/// Resolves a media record to its encrypted bytes on disk.
#[async_trait]
pub trait EncryptedSource: Send + Sync {
    async fn resolve(&self, file_id: &FileId) -> SyncResult<EncryptedBlob>;
}

/// Production source: blobs live under one directory, named by the
/// file's opaque identifier with an `.enc` suffix.
pub struct VaultBlobSource {
    root: PathBuf,
}

impl VaultBlobSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl EncryptedSource for VaultBlobSource {
    async fn resolve(&self, file_id: &FileId) -> SyncResult<EncryptedBlob> {
        let blob_name = format!("{file_id}.enc");
        let path = self.root.join(&blob_name);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| UploadError::LocalFileMissing(blob_name.clone()))?;
        Ok(EncryptedBlob {
            len: meta.len(),
            path,
            blob_name,
        })
    }
}
