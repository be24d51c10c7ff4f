//! Blob storage
//!
//! Photo binaries live outside the database behind the [`BlobStore`] trait.
//! The filesystem implementation names blobs with fresh uuids under a
//! configured directory. Cleanup pipelines treat blob deletion as
//! best-effort; callers log and continue when a delete fails.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// Shared handle to the blob store
pub type DynBlobStore = Arc<dyn BlobStore>;

/// Storage for photo binaries keyed by opaque storage keys
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the generated storage key.
    ///
    /// `extension` becomes part of the key so serving can infer a filename.
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String>;

    /// Delete the blob behind a key; missing blobs are an error the caller
    /// decides how to treat
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read the blob behind a key
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether a blob exists
    async fn exists(&self, key: &str) -> bool;
}

/// Filesystem-backed blob store
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`; the directory is created lazily on
    /// the first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a shared handle
    pub fn shared(root: impl Into<PathBuf>) -> DynBlobStore {
        Arc::new(Self::new(root))
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are generated internally; reject anything path-like anyway
        if key.contains('/') || key.contains('\\') || key.contains("..") {
            anyhow::bail!("Invalid storage key: {}", key);
        }
        Ok(self.root.join(key))
    }

    async fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)
                .await
                .with_context(|| format!("Failed to create blob directory: {:?}", self.root))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<String> {
        self.ensure_root().await?;

        let key = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.path_for(&key)?;
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob: {:?}", path))?;

        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete blob: {:?}", path))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read blob: {:?}", path))
    }

    async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => path.exists(),
            Err(_) => false,
        }
    }
}

/// Best-effort blob deletion: log and swallow failures.
///
/// Shared by every cleanup path so a single unreachable blob never aborts
/// the surrounding reclamation. Returns whether the delete succeeded.
pub async fn delete_blob_best_effort(store: &dyn BlobStore, key: &str) -> bool {
    match store.delete(key).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to delete blob {}: {:#}", key, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FsBlobStore::new(dir.path().join("blobs"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = temp_store();

        let key = store.put(b"fake-jpeg-bytes", "jpg").await.expect("put failed");
        assert!(key.ends_with(".jpg"));
        assert!(store.exists(&key).await);

        let bytes = store.get(&key).await.expect("get failed");
        assert_eq!(bytes, b"fake-jpeg-bytes");
    }

    #[tokio::test]
    async fn test_keys_are_unique() {
        let (_dir, store) = temp_store();

        let a = store.put(b"one", "png").await.unwrap();
        let b = store.put(b"one", "png").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = temp_store();

        let key = store.put(b"bytes", "jpg").await.unwrap();
        store.delete(&key).await.expect("delete failed");
        assert!(!store.exists(&key).await);

        // Deleting again fails loudly; best-effort wrapper swallows it
        assert!(store.delete(&key).await.is_err());
        assert!(!delete_blob_best_effort(&store, &key).await);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, store) = temp_store();

        assert!(store.get("../secrets").await.is_err());
        assert!(store.delete("a/b.jpg").await.is_err());
        assert!(!store.exists("..").await);
    }
}
