//! Filesystem blob store
//!
//! PNG bytes under `<root>/<image_id>.png` via `tokio::fs`. The image id is
//! the content key; callers never overwrite an id with different bytes, so
//! a plain write per save is all the atomicity needed.

use crate::error::{Result, StoreError};
use crate::traits::BlobStore;
use async_trait::async_trait;
use pixelgraph_core::ImageId;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Blob store rooted at a directory on disk
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the root directory if needed and return the store
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, id: ImageId) -> PathBuf {
        self.root.join(format!("{id}.png"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, id: ImageId, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::write(self.path(id), bytes).await?;
        Ok(())
    }

    async fn get(&self, id: ImageId) -> Result<Vec<u8>> {
        match tokio::fs::read(self.path(id)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::ImageNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, id: ImageId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(id)).await?)
    }

    async fn remove(&self, id: ImageId) -> Result<()> {
        match tokio::fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
