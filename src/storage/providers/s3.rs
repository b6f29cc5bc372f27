use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    primitives::ByteStream,
};
use tracing::{debug, error};

use crate::storage::{DerivedImageStore, OriginalImageStore, S3Config, StorageError};

pub struct S3Store {
    client: Client,
    bucket: String,
    name: String,
}

impl S3Store {
    pub async fn new(config: &S3Config) -> Result<Self, StorageError> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "S3 bucket name must not be empty".to_string(),
            ));
        }

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest());

        // Set region if provided, otherwise use default from environment
        if let Some(region) = &config.region {
            aws_config_builder = aws_config_builder.region(Region::new(region.clone()));
        }

        // If credentials are provided, use them. Otherwise, use the default provider chain
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "utsushi-s3-store");
            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        let aws_config = aws_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            name: format!("Amazon S3 ({})", config.bucket),
        })
    }
}

#[async_trait]
impl OriginalImageStore for S3Store {
    async fn load(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        debug!("Loading s3://{}/{}", self.bucket, key);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                error!(
                    "Failed to load s3://{}/{}: {}",
                    self.bucket, key, service_error
                );
                return Err(StorageError::BackendError(service_error.to_string()));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .into_bytes();

        Ok(data.to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl DerivedImageStore for S3Store {
    async fn save(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StorageError> {
        debug!(
            "Saving {} bytes to s3://{}/{}",
            data.len(),
            self.bucket,
            key
        );

        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type)
            .cache_control(cache_control)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to save s3://{}/{}: {}", self.bucket, key, e);
                Err(StorageError::BackendError(e.to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
