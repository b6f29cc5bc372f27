//! The request state machine and the invocation-channel response shape.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::Pipeline;
use super::optimizer::Optimized;
use super::path;
use super::types::OutputFormat;
use crate::storage::object_key;

const FAVICON_MARKER: &str = "favicon";
pub const RETRY_AFTER_SECONDS: &str = "1";

const CACHE_CONTROL_CLIENT_ERROR: &str = "public, max-age=300";
const CACHE_CONTROL_NOT_FOUND: &str = "public, max-age=3600";
const CACHE_CONTROL_SERVER_ERROR: &str = "public, max-age=10";
const CACHE_CONTROL_NO_STORE: &str = "no-store";

/// API-gateway proxy style response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
}

impl ImageResponse {
    /// Short plain-text response for every non-200 outcome
    pub fn text(status: StatusCode, message: &str) -> Self {
        let cache_control = match status {
            StatusCode::NOT_FOUND => CACHE_CONTROL_NOT_FOUND,
            StatusCode::SERVICE_UNAVAILABLE => CACHE_CONTROL_NO_STORE,
            status if status.is_server_error() => CACHE_CONTROL_SERVER_ERROR,
            _ => CACHE_CONTROL_CLIENT_ERROR,
        };

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        );
        headers.insert("cache-control".to_string(), cache_control.to_string());

        Self {
            status_code: status.as_u16(),
            headers,
            body: Some(message.to_string()),
            is_base64_encoded: Some(false),
        }
    }

    /// `body` is base64; `None` for HEAD requests
    pub fn image(format: OutputFormat, cache_control: &str, body: Option<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), format.mime_type().to_string());
        headers.insert("cache-control".to_string(), cache_control.to_string());

        let is_base64_encoded = body.as_ref().map(|_| true);
        Self {
            status_code: StatusCode::OK.as_u16(),
            headers,
            body,
            is_base64_encoded,
        }
    }

    /// Output too large for the channel; the CDN retries against the derived store
    pub fn retry_later() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("retry-after".to_string(), RETRY_AFTER_SECONDS.to_string());
        headers.insert(
            "cache-control".to_string(),
            CACHE_CONTROL_NO_STORE.to_string(),
        );

        Self {
            status_code: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            headers,
            body: None,
            is_base64_encoded: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match (self.body, self.is_base64_encoded) {
            (Some(body), Some(true)) => match BASE64.decode(body) {
                Ok(bytes) => Body::from(bytes),
                Err(e) => {
                    error!("Response body is not valid base64: {}", e);
                    return ImageResponse::text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error",
                    )
                    .into_response();
                }
            },
            (Some(body), _) => Body::from(body),
            (None, _) => Body::empty(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!("Dropping invalid response header {}: {}", name, value),
            }
        }
        response
    }
}

/// API-gateway style invocation event (REST `httpMethod`/`path` or
/// HTTP API `requestContext.http.method`/`rawPath`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub http: Option<HttpContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpContext {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl InvocationEvent {
    fn http_context(&self) -> Option<&HttpContext> {
        self.request_context.as_ref()?.http.as_ref()
    }

    pub fn method(&self) -> Option<&str> {
        self.http_method
            .as_deref()
            .or_else(|| self.http_context()?.method.as_deref())
    }

    pub fn path(&self) -> Option<&str> {
        self.raw_path
            .as_deref()
            .or(self.path.as_deref())
            .or_else(|| self.http_context()?.path.as_deref())
    }
}

impl Pipeline {
    /// Run one invocation event through the pipeline.
    pub async fn handle_event(&self, event: &InvocationEvent) -> ImageResponse {
        let method = event
            .method()
            .and_then(|method| Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok());
        let Some(method) = method else {
            return ImageResponse::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        };
        let Some(path) = event.path() else {
            return ImageResponse::text(StatusCode::NOT_FOUND, "Not found");
        };
        self.handle(&method, path).await
    }

    /// Serve one derived-image request.
    pub async fn handle(&self, method: &Method, path: &str) -> ImageResponse {
        if method != Method::GET && method != Method::HEAD {
            return ImageResponse::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        }
        if path.contains(FAVICON_MARKER) {
            return ImageResponse::text(StatusCode::NOT_FOUND, "Not found");
        }
        let Some(relative) = self.strip_prefix(path) else {
            debug!("Path outside {}: {}", self.config.path_prefix, path);
            return ImageResponse::text(StatusCode::NOT_FOUND, "Not found");
        };

        let params = path::parse(relative);
        if let Some(message) = &params.error {
            debug!("Rejecting {}: {}", path, message);
            return ImageResponse::text(StatusCode::BAD_REQUEST, message);
        }
        let Some(id) = params.id.as_deref() else {
            return ImageResponse::text(StatusCode::NOT_FOUND, "Not found");
        };

        let key = object_key(&self.key_template, id);
        let original = match self.originals.load(&key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("Original not found: {}", key);
                return ImageResponse::text(StatusCode::NOT_FOUND, "Image not found");
            }
            Err(e) => {
                error!("Failed to load original {} from {}: {}", key, self.originals.name(), e);
                return ImageResponse::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                );
            }
        };

        let optimized = match self.optimizer.optimize(original, &params).await {
            Ok(optimized) => optimized,
            Err(e) => {
                error!("Failed to transform {} ({:?}): {}", path, params, e);
                return ImageResponse::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                );
            }
        };

        self.respond(*method == Method::HEAD, path, optimized).await
    }

    /// Path relative to the routing prefix, or `None` if outside it
    fn strip_prefix<'a>(&self, path: &'a str) -> Option<&'a str> {
        let prefix = self.config.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }

    async fn respond(&self, head_only: bool, path: &str, optimized: Optimized) -> ImageResponse {
        let Optimized {
            buffer,
            format,
            size,
        } = optimized;
        let content_type = format.mime_type();
        let derived_key = path.trim_start_matches('/');
        let buffer = Arc::new(buffer);

        let (saved, encoded) = tokio::join!(
            self.derived
                .save(derived_key, &buffer, content_type, &self.config.cache_control),
            encode_body(buffer.clone(), head_only),
        );

        if let Err(e) = saved {
            warn!(
                "Failed to save derived image {} to {}: {}",
                derived_key,
                self.derived.name(),
                e
            );
        }

        let body = match encoded {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode response body for {}: {}", path, e);
                return ImageResponse::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                );
            }
        };

        if let Some(body) = &body
            && body.len() > self.config.max_response_bytes
        {
            info!(
                "Response for {} too large ({} bytes encoded), asking caller to retry",
                path,
                body.len()
            );
            return ImageResponse::retry_later();
        }

        debug!(
            "Serving {} as {} {} ({} bytes)",
            path,
            format,
            size,
            buffer.len()
        );
        ImageResponse::image(format, &self.config.cache_control, body)
    }
}

async fn encode_body(
    buffer: Arc<Vec<u8>>,
    head_only: bool,
) -> Result<Option<String>, tokio::task::JoinError> {
    if head_only {
        return Ok(None);
    }
    tokio::task::spawn_blocking(move || BASE64.encode(buffer.as_slice()))
        .await
        .map(Some)
}
