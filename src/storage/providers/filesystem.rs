use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::storage::{DerivedImageStore, OriginalImageStore, StorageError};

/// Object store backed by a local directory. Keys map to relative paths.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if key.is_empty()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl OriginalImageStore for FilesystemStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "Filesystem"
    }
}

#[async_trait]
impl DerivedImageStore for FilesystemStore {
    async fn save(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        _cache_control: &str,
    ) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!(
            "Stored derived image {:?} ({}, {} bytes)",
            path,
            content_type,
            data.len()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "Filesystem"
    }
}
