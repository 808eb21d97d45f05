use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tubely_core::constants::VIDEO_FORM_FIELD;
use tubely_core::{AppError, VideoRecord};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::HttpAppError;
use crate::state::AppState;

/// `POST /api/video_upload/{video_id}`: replace the video of a record the caller owns.
///
/// Ownership is checked before the body is read. The `video` part is streamed
/// straight into the ingest pipeline without being buffered in memory.
#[tracing::instrument(
    skip(state, multipart),
    fields(user_id = %user.user_id, video_id = %video_id, operation = "upload_video")
)]
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(video_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<VideoRecord>, HttpAppError> {
    let record = state.pipeline.authorize(video_id, user.user_id).await?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(VIDEO_FORM_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let body = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));

        let cancel = state.shutdown.child_token();
        let updated = state
            .pipeline
            .ingest(
                record,
                &content_type,
                body,
                state.config.max_video_size_bytes() as u64,
                &cancel,
            )
            .await?;

        return Ok(Json(updated));
    }

    Err(AppError::InvalidInput(format!("Missing multipart field '{}'", VIDEO_FORM_FIELD)).into())
}
