use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

use super::params::Params;
use super::ApiError;

#[derive(Serialize)]
pub struct SetResponse {
    pub key: String,
    pub success: bool,
}

/// Fetch a cached artifact by key
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let contents = state
        .cache
        .get(&key)
        .await
        .ok_or_else(|| ApiError::not_found("artifact"))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], contents).into_response())
}

/// Store `contents` and return its generated key
pub async fn set_artifact(
    State(state): State<Arc<AppState>>,
    Params(params): Params,
) -> Result<Json<SetResponse>, ApiError> {
    let contents = params
        .text("contents")
        .ok_or_else(|| ApiError::bad_request("contents is required"))?;
    let key = state.cache.set(contents).await;
    tracing::debug!("Stored artifact {}", key);
    Ok(Json(SetResponse { key, success: true }))
}
