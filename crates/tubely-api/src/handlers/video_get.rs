use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tubely_core::{AppError, VideoResponse};
use tubely_storage::ObjectReference;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::HttpAppError;
use crate::state::AppState;

/// `GET /api/videos/{video_id}`: the record with `video_url` replaced by a
/// time-limited signed URL.
#[tracing::instrument(
    skip(state),
    fields(user_id = %user.user_id, video_id = %video_id, operation = "get_video")
)]
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(video_id): Path<Uuid>,
) -> Result<Json<VideoResponse>, HttpAppError> {
    let video = state
        .videos
        .get_video(video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    if !video.is_owned_by(user.user_id) {
        return Err(AppError::NotAuthorized("You are not the owner of this video".to_string()).into());
    }

    let signed = match video.video_url.as_deref() {
        Some(stored) => {
            let reference: ObjectReference = stored.parse().map_err(|e| {
                tracing::error!(error = %e, video_url = %stored, "Stored video reference is malformed");
                HttpAppError::from(e)
            })?;
            let url = state
                .storage
                .signed_url(&reference, state.config.ingest().signed_url_ttl)
                .await?;
            Some(url)
        }
        None => None,
    };

    Ok(Json(VideoResponse::with_video_url(video, signed)))
}
