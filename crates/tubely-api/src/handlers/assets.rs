//! Signed asset delivery for the local storage backend.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use futures::TryStreamExt;
use serde::Deserialize;
use tubely_core::AppError;
use tubely_storage::Storage;

use crate::error::HttpAppError;
use crate::state::AppState;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: u64,
    pub signature: String,
}

/// `GET /assets/{*key}?expires=..&signature=..`
#[tracing::instrument(skip(state, query), fields(operation = "get_asset"))]
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, HttpAppError> {
    let Some(local) = state.assets.as_ref() else {
        return Err(AppError::NotFound("Assets are not served by this backend".to_string()).into());
    };

    local
        .signer()
        .verify_signed_access(&key, query.expires, &query.signature)
        .map_err(|e| {
            tracing::debug!(error = %e, key = %key, "Rejected asset request");
            AppError::NotAuthorized("Invalid or expired signature".to_string())
        })?;

    let object = local.download_stream(&key).await?;

    let (content_type, cache_control) = match &object.attributes {
        Some(attrs) => (attrs.content_type.clone(), Some(attrs.cache_control.clone())),
        None => (FALLBACK_CONTENT_TYPE.to_string(), None),
    };

    let body = Body::from_stream(
        object
            .stream
            .map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e))),
    );

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, object.size);
    if let Some(cache_control) = cache_control {
        builder = builder.header(header::CACHE_CONTROL, cache_control);
    }

    builder.body(body).map_err(|e| {
        tracing::error!(error = %e, "Failed to build response");
        HttpAppError::from(AppError::Internal(e.to_string()))
    })
}
