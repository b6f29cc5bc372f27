use axum::{
    extract::State,
    http::{Method, Uri},
    response::IntoResponse,
};

use crate::AppState;

/// Every method and path lands here; the pipeline does its own gating.
pub async fn image_handler(
    State(app_state): State<AppState>,
    method: Method,
    uri: Uri,
) -> impl IntoResponse {
    app_state.pipeline.handle(&method, uri.path()).await
}
