use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod commands;
pub mod copyright;
pub mod pipeline;
pub mod startup_checks;
pub mod storage;
pub mod webp_encoder;

pub use storage::StorageSystemConfig;

pub const ENV_ORIGINAL_BUCKET: &str = "ORIGINAL_BUCKET";
pub const ENV_DERIVED_BUCKET: &str = "DERIVED_BUCKET";
pub const ENV_ORIGINAL_KEY_TEMPLATE: &str = "ORIGINAL_KEY_TEMPLATE";
pub const ENV_DEFAULT_QUALITY: &str = "DEFAULT_QUALITY";
pub const ENV_CACHE_CONTROL: &str = "CACHE_CONTROL";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageSystemConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub copyright_holder: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Routing prefix stripped before the path is parsed
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Encode quality for jpeg and webp when the request does not force one
    #[serde(default = "default_quality")]
    pub default_quality: u8,
    /// Cache-Control for successful responses and saved derived images
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    /// Largest base64 body returned inline; larger ones get a 503 retry
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_path_prefix() -> String {
    "/i".to_string()
}

fn default_quality() -> u8 {
    80
}

fn default_cache_control() -> String {
    "public, max-age=31536000, immutable".to_string()
}

fn default_max_response_bytes() -> usize {
    5_000_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Utsushi".to_string(),
            log_level: default_log_level(),
            copyright_holder: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            default_quality: default_quality(),
            cache_control: default_cache_control(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl Config {
    /// Apply process environment overrides on top of the file configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(bucket) = lookup(ENV_ORIGINAL_BUCKET) {
            info!("{} set, reading originals from s3://{}", ENV_ORIGINAL_BUCKET, bucket);
            self.storage.original.provider =
                storage::StorageProviderConfig::S3(storage::S3Config::for_bucket(bucket));
        }
        if let Some(bucket) = lookup(ENV_DERIVED_BUCKET) {
            info!("{} set, writing derived images to s3://{}", ENV_DERIVED_BUCKET, bucket);
            self.storage.derived.provider =
                storage::StorageProviderConfig::S3(storage::S3Config::for_bucket(bucket));
        }
        if let Some(template) = lookup(ENV_ORIGINAL_KEY_TEMPLATE) {
            self.storage.original.key_template = template;
        }
        if let Some(quality) = lookup(ENV_DEFAULT_QUALITY) {
            match quality.trim().parse::<u8>() {
                Ok(quality) => self.pipeline.default_quality = quality,
                Err(e) => warn!(
                    "Ignoring {}={:?}: {}",
                    ENV_DEFAULT_QUALITY, quality, e
                ),
            }
        }
        if let Some(cache_control) = lookup(ENV_CACHE_CONTROL) {
            self.pipeline.cache_control = cache_control;
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: pipeline::SharedPipeline,
}

pub async fn create_app(config: Config) -> Result<Router, storage::StorageError> {
    let pipeline = pipeline::Pipeline::from_config(&config).await?;
    Ok(create_app_with_pipeline(std::sync::Arc::new(pipeline)))
}

/// Router over an already-built pipeline (custom stores, tests)
pub fn create_app_with_pipeline(pipeline: pipeline::SharedPipeline) -> Router {
    let app_state = AppState { pipeline };

    Router::new()
        .route("/", axum::routing::any(pipeline::image_handler))
        .route("/{*path}", axum::routing::any(pipeline::image_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let method = request.method();
                    let uri = request.uri();
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");
                    let referer = headers
                        .get("referer")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %method,
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        referer = %referer,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %status,
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: Config = toml_edit::de::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pipeline.path_prefix, "/i");
        assert_eq!(config.pipeline.default_quality, 80);
        assert_eq!(config.pipeline.max_response_bytes, 5_000_000);
        assert_eq!(
            config.pipeline.cache_control,
            "public, max-age=31536000, immutable"
        );
        assert_eq!(config.storage.original.key_template, "${ID}");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 8080

            [app]
            name = "Photos"
            copyright_holder = "Jane Doe"

            [pipeline]
            default_quality = 75

            [storage.original]
            provider = "s3"
            bucket = "originals"
            key_template = "uploads/${ID}"

            [storage.derived]
            provider = "null"
        "#;
        let config: Config = toml_edit::de::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.app.copyright_holder.as_deref(), Some("Jane Doe"));
        assert_eq!(config.app.log_level, "info");
        assert_eq!(config.pipeline.default_quality, 75);
        assert_eq!(config.pipeline.path_prefix, "/i");
        assert_eq!(config.storage.original.key_template, "uploads/${ID}");
        assert!(matches!(
            config.storage.original.provider,
            storage::StorageProviderConfig::S3(ref s3) if s3.bucket == "originals"
        ));
        assert!(matches!(
            config.storage.derived.provider,
            storage::StorageProviderConfig::Null
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ORIGINAL_BUCKET, "orig-bucket"),
            (ENV_DERIVED_BUCKET, "derived-bucket"),
            (ENV_ORIGINAL_KEY_TEMPLATE, "photos/${ID}"),
            (ENV_DEFAULT_QUALITY, "65"),
            (ENV_CACHE_CONTROL, "public, max-age=60"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert!(matches!(
            config.storage.original.provider,
            storage::StorageProviderConfig::S3(ref s3) if s3.bucket == "orig-bucket"
        ));
        assert!(matches!(
            config.storage.derived.provider,
            storage::StorageProviderConfig::S3(ref s3) if s3.bucket == "derived-bucket"
        ));
        assert_eq!(config.storage.original.key_template, "photos/${ID}");
        assert_eq!(config.pipeline.default_quality, 65);
        assert_eq!(config.pipeline.cache_control, "public, max-age=60");
    }

    #[test]
    fn test_invalid_or_empty_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            ENV_DEFAULT_QUALITY => Some("very high".to_string()),
            ENV_CACHE_CONTROL => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.pipeline.default_quality, 80);
        assert_eq!(
            config.pipeline.cache_control,
            "public, max-age=31536000, immutable"
        );
        assert!(matches!(
            config.storage.original.provider,
            storage::StorageProviderConfig::Filesystem(_)
        ));
    }
}
