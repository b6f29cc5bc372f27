use async_trait::async_trait;
use tracing::info;

use crate::storage::{DerivedImageStore, StorageError};

/// Derived store that only logs. Every request re-runs the pipeline.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DerivedImageStore for NullStore {
    async fn save(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StorageError> {
        info!(
            "NULL STORE - Would save derived image: key={} content-type={} cache-control={} size={}",
            key,
            content_type,
            cache_control,
            data.len()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "Null Store (Logging Only)"
    }
}
