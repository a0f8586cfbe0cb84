//! Image file storage.
//!
//! Paths are relative [`BlobPath`]s rooted under the media directory. The
//! filesystem store never leaves a partially written file behind on failure.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use domain::BlobPath;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::faults::{FaultPlan, Operation};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` at `path`, creating parent folders as needed.
    async fn write(&self, path: &BlobPath, bytes: &[u8]) -> Result<()>;

    async fn read(&self, path: &BlobPath) -> Result<Vec<u8>>;

    /// Removes the file at `path`. Fails with `NotFound` if it is absent.
    async fn delete(&self, path: &BlobPath) -> Result<()>;

    async fn exists(&self, path: &BlobPath) -> Result<bool>;
}

/// Blob store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a blob path under the root, rejecting anything that could escape it.
    fn resolve(&self, path: &BlobPath) -> Result<PathBuf> {
        let relative = Path::new(path.as_str());
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.as_str().is_empty() || !clean {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn map_not_found(err: std::io::Error, path: &BlobPath) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::not_found("file", path)
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn write(&self, path: &BlobPath, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&full).await?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&full).await {
                tracing::warn!(%path, error = %cleanup, "Failed to remove partial file");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, path: &BlobPath) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, path: &BlobPath) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn exists(&self, path: &BlobPath) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }
}

#[derive(Debug, Default)]
struct BlobState {
    files: HashMap<BlobPath, Vec<u8>>,
    faults: FaultPlan,
}

/// In-memory blob store with fault injection, for testing.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    state: Arc<RwLock<BlobState>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_on(&self, op: Operation, nth: u32) {
        self.state.write().await.faults.fail_on(op, nth);
    }

    pub async fn fail_always(&self, op: Operation) {
        self.state.write().await.faults.fail_always(op);
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    pub async fn file_count(&self) -> usize {
        self.state.read().await.files.len()
    }

    /// Returns the stored bytes without going through fault checks.
    pub async fn contents(&self, path: &BlobPath) -> Option<Vec<u8>> {
        self.state.read().await.files.get(path).cloned()
    }

    /// Every stored path, sorted.
    pub async fn paths(&self) -> Vec<BlobPath> {
        let mut paths: Vec<_> = self.state.read().await.files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn write(&self, path: &BlobPath, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::WriteBlob)?;
        state.files.insert(path.clone(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, path: &BlobPath) -> Result<Vec<u8>> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::ReadBlob)?;
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::not_found("file", path))
    }

    async fn delete(&self, path: &BlobPath) -> Result<()> {
        let mut state = self.state.write().await;
        state.faults.check(Operation::DeleteBlob)?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("file", path))
    }

    async fn exists(&self, path: &BlobPath) -> Result<bool> {
        Ok(self.state.read().await.files.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("blob-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_fs_write_read_delete() {
        let root = temp_root();
        let store = FsBlobStore::new(&root);
        let path = BlobPath::new("garments/abc/g_1.webp");

        store.write(&path, b"pixels").await.unwrap();
        assert!(store.exists(&path).await.unwrap());
        assert_eq!(store.read(&path).await.unwrap(), b"pixels");

        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
        assert!(store.delete(&path).await.unwrap_err().is_not_found());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_fs_rejects_escaping_paths() {
        let store = FsBlobStore::new(temp_root());
        for bad in ["../secret.png", "/etc/passwd", "garments/../../x", ""] {
            let result = store.write(&BlobPath::new(bad), b"x").await;
            assert!(
                matches!(result, Err(StoreError::InvalidPath(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_memory_faults() {
        let store = InMemoryBlobStore::new();
        let path = BlobPath::new("masks/a/m.webp");
        store.fail_on(Operation::WriteBlob, 2).await;

        store.write(&path, b"one").await.unwrap();
        let second = BlobPath::new("masks/a/n.webp");
        assert!(store.write(&second, b"two").await.is_err());

        assert_eq!(store.file_count().await, 1);
        assert_eq!(store.contents(&path).await.unwrap(), b"one");
        assert_eq!(store.paths().await, vec![path]);
    }
}
