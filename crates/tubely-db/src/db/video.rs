use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use tubely_core::{AppError, VideoRecord};
use uuid::Uuid;

/// Metadata store seen by the ingest pipeline.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, id: Uuid) -> Result<Option<VideoRecord>, AppError>;

    /// Persist the mutable fields of an existing record.
    ///
    /// Returns `NotFound` when the record no longer exists.
    async fn update_video(&self, video: &VideoRecord) -> Result<(), AppError>;
}

/// Postgres-backed repository over the `videos` table
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select", db.record_id = %id))]
    async fn get_video(&self, id: Uuid) -> Result<Option<VideoRecord>, AppError> {
        let video = sqlx::query_as::<Postgres, VideoRecord>(
            r#"
            SELECT id, user_id, title, description, thumbnail_url, video_url,
                   created_at, updated_at
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }

    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "update", db.record_id = %video.id))]
    async fn update_video(&self, video: &VideoRecord) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET title = $2, description = $3, thumbnail_url = $4, video_url = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Video {} not found", video.id)));
        }

        Ok(())
    }
}
