//! Ingest pipeline: authorize → stage → probe → rewrite → classify → upload →
//! record update.
//!
//! Stages run strictly in sequence inside one request. Scratch files are owned
//! by the stage that produced them and are gone by the time [`VideoIngestPipeline::run`]
//! returns, whatever the outcome.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tubely_core::{AppError, IngestConfig, VideoRecord};
use tubely_db::VideoRepository;
use tubely_storage::{classify, extension_for, normalize_content_type, Storage};
use uuid::Uuid;

use crate::error::upload_error;
use crate::faststart::{create_rewriter, FastStartRewriter};
use crate::probe::{create_prober, VideoProber};
use crate::staging::stage;

/// One upload: who is sending what to which record.
pub struct UploadRequest {
    pub principal: Uuid,
    pub video_id: Uuid,
    pub content_type: String,
    /// Declared bound; the effective limit is the smaller of this and the
    /// configured maximum.
    pub size_limit: u64,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("principal", &self.principal)
            .field("video_id", &self.video_id)
            .field("content_type", &self.content_type)
            .field("size_limit", &self.size_limit)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct VideoIngestPipeline {
    repository: Arc<dyn VideoRepository>,
    storage: Arc<dyn Storage>,
    prober: Arc<dyn VideoProber>,
    rewriter: Arc<dyn FastStartRewriter>,
    config: IngestConfig,
}

impl VideoIngestPipeline {
    pub fn new(
        repository: Arc<dyn VideoRepository>,
        storage: Arc<dyn Storage>,
        prober: Arc<dyn VideoProber>,
        rewriter: Arc<dyn FastStartRewriter>,
        config: IngestConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            prober,
            rewriter,
            config,
        }
    }

    /// Pipeline with the media tool backend chosen by `config`.
    pub fn from_config(
        repository: Arc<dyn VideoRepository>,
        storage: Arc<dyn Storage>,
        config: IngestConfig,
    ) -> Self {
        let prober = create_prober(&config);
        let rewriter = create_rewriter(&config);
        Self::new(repository, storage, prober, rewriter, config)
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Load the target record and check that `principal` owns it.
    #[tracing::instrument(skip(self))]
    pub async fn authorize(&self, video_id: Uuid, principal: Uuid) -> Result<VideoRecord, AppError> {
        let record = self
            .repository
            .get_video(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", video_id)))?;

        if !record.is_owned_by(principal) {
            tracing::warn!(
                video_id = %video_id,
                principal = %principal,
                owner = %record.user_id,
                "Upload rejected: principal does not own the video"
            );
            return Err(AppError::NotAuthorized(
                "You are not the owner of this video".to_string(),
            ));
        }
        Ok(record)
    }

    /// Normalized content type if it is allowed and has a known extension.
    pub fn check_content_type(&self, content_type: &str) -> Result<String, AppError> {
        let normalized = normalize_content_type(content_type);
        let allowed = self
            .config
            .allowed_content_types
            .iter()
            .any(|ct| normalize_content_type(ct) == normalized);

        if !allowed || extension_for(&normalized).is_none() {
            return Err(AppError::InvalidContentType(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }
        Ok(normalized)
    }

    /// Run every stage after authorization and return the updated record.
    #[tracing::instrument(skip(self, record, body, cancel), fields(video_id = %record.id))]
    pub async fn ingest<R>(
        &self,
        mut record: VideoRecord,
        content_type: &str,
        body: R,
        size_limit: u64,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, AppError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let total = Instant::now();
        let content_type = self.check_content_type(content_type)?;
        let limit = size_limit.min(self.config.max_video_size_bytes as u64);

        let started = Instant::now();
        let staged = stage(body, limit, self.config.scratch_dir.as_deref(), cancel).await?;
        tracing::info!(
            stage = "staging",
            bytes = staged.size(),
            duration_ms = started.elapsed().as_millis(),
            "Stage completed"
        );

        let started = Instant::now();
        let probe = self.prober.probe(staged.path()).await?;
        tracing::info!(
            stage = "probe",
            width = probe.width,
            height = probe.height,
            orientation = %probe.orientation,
            duration_ms = started.elapsed().as_millis(),
            "Stage completed"
        );

        let started = Instant::now();
        let processed = self.rewriter.rewrite(staged.path()).await?;
        tracing::info!(
            stage = "rewrite",
            bytes = processed.size(),
            duration_ms = started.elapsed().as_millis(),
            "Stage completed"
        );
        staged.close();

        let key = classify(probe.orientation, &content_type).map_err(upload_error)?;

        let started = Instant::now();
        let reference = self
            .storage
            .upload_file(
                processed.path(),
                &key,
                &content_type,
                &self.config.cache_control,
            )
            .await
            .map_err(upload_error)?;
        tracing::info!(
            stage = "upload",
            storage_key = %key,
            bucket = %reference.bucket,
            duration_ms = started.elapsed().as_millis(),
            "Stage completed"
        );
        processed.close();

        let started = Instant::now();
        record.attach_video(reference.to_string());
        if let Err(e) = self.repository.update_video(&record).await {
            tracing::error!(
                error = %e,
                video_id = %record.id,
                orphaned_storage_key = %reference.key,
                bucket = %reference.bucket,
                "Stored video but failed to update its record"
            );
            return Err(AppError::MetadataUpdateFailed {
                storage_key: reference.key,
                message: e.to_string(),
            });
        }
        tracing::info!(
            stage = "record_update",
            duration_ms = started.elapsed().as_millis(),
            "Stage completed"
        );

        tracing::info!(
            video_id = %record.id,
            video_url = ?record.video_url,
            duration_ms = total.elapsed().as_millis(),
            "Video ingested"
        );
        Ok(record)
    }

    /// Authorize then ingest. No scratch file is created for a rejected request.
    #[tracing::instrument(skip(self, request, cancel), fields(
        video_id = %request.video_id,
        principal = %request.principal,
        content_type = %request.content_type
    ))]
    pub async fn run(
        &self,
        request: UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<VideoRecord, AppError> {
        let UploadRequest {
            principal,
            video_id,
            content_type,
            size_limit,
            body,
        } = request;

        let record = self.authorize(video_id, principal).await?;
        self.ingest(record, &content_type, body, size_limit, cancel).await
    }
}
