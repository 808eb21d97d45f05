//! Application state shared by every handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tubely_core::Config;
use tubely_db::VideoRepository;
use tubely_processing::VideoIngestPipeline;
use tubely_storage::{LocalStorage, Storage};

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub videos: Arc<dyn VideoRepository>,
    pub storage: Arc<dyn Storage>,
    pub pipeline: VideoIngestPipeline,
    pub jwt: Arc<JwtService>,
    /// Set when objects live on the local filesystem and are served by `/assets`
    pub assets: Option<Arc<LocalStorage>>,
    /// Cancelled on graceful shutdown; uploads run under child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        videos: Arc<dyn VideoRepository>,
        storage: Arc<dyn Storage>,
        assets: Option<Arc<LocalStorage>>,
    ) -> Self {
        let pipeline =
            VideoIngestPipeline::from_config(videos.clone(), storage.clone(), config.ingest().clone());
        let jwt = Arc::new(JwtService::new(config.jwt_secret()));

        Self {
            config,
            videos,
            storage,
            pipeline,
            jwt,
            assets,
            shutdown: CancellationToken::new(),
        }
    }
}
