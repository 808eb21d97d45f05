//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use tubely_core::Config;
use tubely_db::PgVideoRepository;

use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.is_production());
    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;
    let videos = Arc::new(PgVideoRepository::new(pool));

    let (storage, assets) = storage::setup_storage(&config).await?;

    let state = Arc::new(AppState::new(config, videos, storage, assets));
    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
