// Pipeline module - on-demand derived image generation
mod error;
pub mod geometry;
mod handlers;
pub mod image_processing;
pub mod optimizer;
pub mod path;
mod serve;
pub mod types;

// Re-export public items
pub use error::PipelineError;
pub use handlers::image_handler;
pub use optimizer::{FormatOptimizer, Optimized};
pub use serve::{ImageResponse, InvocationEvent};
pub use types::*;

use std::sync::Arc;
use tracing::info;

use crate::storage::{self, DynDerivedStore, DynOriginalStore, StorageError};

pub type SharedPipeline = Arc<Pipeline>;

pub struct Pipeline {
    pub(crate) config: crate::PipelineConfig,
    pub(crate) optimizer: FormatOptimizer,
    pub(crate) originals: DynOriginalStore,
    pub(crate) derived: DynDerivedStore,
    pub(crate) key_template: String,
}

impl Pipeline {
    pub fn new(
        config: crate::PipelineConfig,
        app_config: &crate::AppConfig,
        key_template: String,
        originals: DynOriginalStore,
        derived: DynDerivedStore,
    ) -> Self {
        let optimizer =
            FormatOptimizer::new(config.default_quality, app_config.copyright_holder.clone());
        Self {
            config,
            optimizer,
            originals,
            derived,
            key_template,
        }
    }

    /// Build the pipeline and its stores from the application config.
    pub async fn from_config(config: &crate::Config) -> Result<Self, StorageError> {
        let originals = storage::create_original_store(&config.storage.original.provider).await?;
        let derived = storage::create_derived_store(&config.storage.derived.provider).await?;

        info!(
            "Image pipeline: originals from {} ({}), derived to {} ({})",
            originals.name(),
            config.storage.original.provider.describe(),
            derived.name(),
            config.storage.derived.provider.describe()
        );

        Ok(Self::new(
            config.pipeline.clone(),
            &config.app,
            config.storage.original.key_template.clone(),
            originals,
            derived,
        ))
    }
}
