use crate::Config;
use crate::storage::{ID_PLACEHOLDER, StorageProviderConfig};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Original key template {0:?} does not contain ${{ID}}")]
    KeyTemplateMissingId(String),

    #[error("Default quality {0} is outside 1..=100")]
    InvalidDefaultQuality(u8),

    #[error("Original image directory does not exist: {0}")]
    OriginalDirectoryMissing(String),

    #[error("Failed to create derived image directory: {0}")]
    DerivedDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Routing prefix must start with '/': {0:?}")]
    InvalidPathPrefix(String),
}

impl StartupCheckError {
    /// Errors the server cannot run with
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::KeyTemplateMissingId(_)
                | StartupCheckError::InvalidDefaultQuality(_)
                | StartupCheckError::InvalidPathPrefix(_)
                | StartupCheckError::DerivedDirectoryCreationFailed(_)
        )
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let template = &config.storage.original.key_template;
    if !template.contains(ID_PLACEHOLDER) {
        error!("Original key template has no {} placeholder: {}", ID_PLACEHOLDER, template);
        errors.push(StartupCheckError::KeyTemplateMissingId(template.clone()));
    }

    let quality = config.pipeline.default_quality;
    if !(1..=100).contains(&quality) {
        error!("Default quality out of range: {}", quality);
        errors.push(StartupCheckError::InvalidDefaultQuality(quality));
    }

    let prefix = &config.pipeline.path_prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        error!("Routing prefix does not start with '/': {}", prefix);
        errors.push(StartupCheckError::InvalidPathPrefix(prefix.clone()));
    }

    // Original store directory
    if let StorageProviderConfig::Filesystem(fs) = &config.storage.original.provider {
        let directory = Path::new(&fs.directory);
        if !directory.exists() {
            warn!("Original image directory does not exist: {:?}", directory);
            errors.push(StartupCheckError::OriginalDirectoryMissing(
                directory.display().to_string(),
            ));
        } else {
            info!("Original image directory exists: {:?}", directory);
        }
    }

    // Derived store directory
    if let StorageProviderConfig::Filesystem(fs) = &config.storage.derived.provider {
        let directory = Path::new(&fs.directory);
        if !directory.exists() {
            info!(
                "Derived image directory does not exist, creating: {:?}",
                directory
            );
            if let Err(e) = tokio::fs::create_dir_all(directory).await {
                error!("Failed to create derived image directory: {}", e);
                errors.push(StartupCheckError::DerivedDirectoryCreationFailed(e));
            } else {
                info!("Derived image directory created successfully");
            }
        } else {
            info!("Derived image directory exists: {:?}", directory);
        }
    }

    if matches!(config.storage.derived.provider, StorageProviderConfig::Null) {
        warn!("Derived images are not persisted; every request runs the full pipeline");
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
