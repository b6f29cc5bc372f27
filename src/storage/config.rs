use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ID_PLACEHOLDER: &str = "${ID}";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSystemConfig {
    pub original: OriginalStorageConfig,
    pub derived: DerivedStorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginalStorageConfig {
    /// Object key for an original image; every `${ID}` is replaced by the image id
    #[serde(default = "default_key_template")]
    pub key_template: String,
    #[serde(flatten)]
    pub provider: StorageProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DerivedStorageConfig {
    #[serde(flatten)]
    pub provider: StorageProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageProviderConfig {
    S3(S3Config),
    Filesystem(FilesystemConfig),
    Null,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemConfig {
    pub directory: PathBuf,
}

fn default_key_template() -> String {
    ID_PLACEHOLDER.to_string()
}

impl S3Config {
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl StorageProviderConfig {
    pub fn describe(&self) -> String {
        match self {
            StorageProviderConfig::S3(s3) => format!("s3://{}", s3.bucket),
            StorageProviderConfig::Filesystem(fs) => format!("file://{}", fs.directory.display()),
            StorageProviderConfig::Null => "null".to_string(),
        }
    }
}

impl Default for StorageSystemConfig {
    fn default() -> Self {
        Self {
            original: OriginalStorageConfig {
                key_template: default_key_template(),
                provider: StorageProviderConfig::Filesystem(FilesystemConfig {
                    directory: PathBuf::from("originals"),
                }),
            },
            derived: DerivedStorageConfig {
                provider: StorageProviderConfig::Filesystem(FilesystemConfig {
                    directory: PathBuf::from("derived"),
                }),
            },
        }
    }
}

/// Expand a key template for an image id.
pub fn object_key(template: &str, id: &str) -> String {
    template.replace(ID_PLACEHOLDER, id)
}
