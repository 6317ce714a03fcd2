use crate::error::BlobError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Binary storage for photo content
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key` and return a publicly resolvable URL for it
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, BlobError>;

    /// Remove the blob stored under `key`
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Stores blobs as files below a root directory
pub struct LocalBlobStore {
    root: PathBuf,
    public_url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url_prefix: &str) -> Self {
        let root = root.into();
        info!(root = %root.display(), "Local blob store initialized");
        Self {
            root,
            public_url_prefix: public_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(BlobError::Other(anyhow::anyhow!("invalid blob key {key}")));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(key: &str, err: std::io::Error, action: &'static str) -> BlobError {
    match err.kind() {
        ErrorKind::PermissionDenied => BlobError::PermissionDenied {
            key: key.to_string(),
        },
        ErrorKind::TimedOut => BlobError::Timeout {
            key: key.to_string(),
        },
        _ => BlobError::Other(anyhow::Error::new(err).context(action)),
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<String, BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e, "Failed to create blob directory"))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| io_error(key, e, "Failed to write blob"))?;

        debug!(path = %path.display(), "Blob written");
        Ok(format!("{}/{}", self.public_url_prefix, key))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e, "Failed to delete blob")),
        }
    }
}

/// Keeps blobs in process memory
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Bytes, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.blobs.lock().get(key).map(|(body, _)| body.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.lock().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, BlobError> {
        self.blobs
            .lock()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.blobs.lock().remove(key);
        Ok(())
    }
}

/// Resolve the public URL for `key` below `prefix`
pub fn public_url(prefix: &str, key: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), key)
}

/// Read a staged upload fully into memory
pub async fn read_staged(path: &Path) -> std::io::Result<Bytes> {
    tokio::fs::read(path).await.map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/uploads/");

        let url = store
            .put("albums/abcd1234/1_x.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(url, "/uploads/albums/abcd1234/1_x.jpg");
        let written = std::fs::read(dir.path().join("albums/abcd1234/1_x.jpg")).unwrap();
        assert_eq!(written, b"jpeg");

        store.delete("albums/abcd1234/1_x.jpg").await.unwrap();
        assert!(!dir.path().join("albums/abcd1234/1_x.jpg").exists());
        // deleting twice is fine
        store.delete("albums/abcd1234/1_x.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/uploads");

        let err = store
            .put("../escape.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Other(_)));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        let url = store
            .put("albums/a/1.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        assert_eq!(url, "memory://albums/a/1.png");
        assert_eq!(store.get("albums/a/1.png").unwrap(), Bytes::from_static(b"png"));
        assert_eq!(store.content_type("albums/a/1.png").unwrap(), "image/png");

        store.delete("albums/a/1.png").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("https://cdn.example.com/", "a/b.jpg"), "https://cdn.example.com/a/b.jpg");
    }
}
