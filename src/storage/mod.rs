pub mod config;
pub mod error;
pub mod providers;

pub use config::*;
pub use error::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Read access to the original, uploaded images.
#[async_trait]
pub trait OriginalImageStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    fn name(&self) -> &str;
}

/// Write access to the cache of derived images the CDN reads from.
#[async_trait]
pub trait DerivedImageStore: Send + Sync {
    async fn save(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StorageError>;
    fn name(&self) -> &str;
}

pub type DynOriginalStore = Arc<dyn OriginalImageStore>;
pub type DynDerivedStore = Arc<dyn DerivedImageStore>;

pub async fn create_original_store(
    config: &StorageProviderConfig,
) -> Result<DynOriginalStore, StorageError> {
    match config {
        StorageProviderConfig::S3(s3_config) => {
            Ok(Arc::new(providers::s3::S3Store::new(s3_config).await?))
        }
        StorageProviderConfig::Filesystem(fs_config) => Ok(Arc::new(
            providers::filesystem::FilesystemStore::new(fs_config.directory.clone()),
        )),
        StorageProviderConfig::Null => Err(StorageError::ConfigError(
            "the null provider cannot serve original images".to_string(),
        )),
    }
}

pub async fn create_derived_store(
    config: &StorageProviderConfig,
) -> Result<DynDerivedStore, StorageError> {
    match config {
        StorageProviderConfig::S3(s3_config) => {
            Ok(Arc::new(providers::s3::S3Store::new(s3_config).await?))
        }
        StorageProviderConfig::Filesystem(fs_config) => Ok(Arc::new(
            providers::filesystem::FilesystemStore::new(fs_config.directory.clone()),
        )),
        StorageProviderConfig::Null => Ok(Arc::new(providers::null::NullStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_provider_rejected_for_originals() {
        let result = create_original_store(&StorageProviderConfig::Null).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_null_provider_accepted_for_derived() {
        let store = create_derived_store(&StorageProviderConfig::Null)
            .await
            .unwrap();
        assert_eq!(store.name(), "Null Store (Logging Only)");
    }
}
