//! Storage backend setup

use std::sync::Arc;

use anyhow::{Context, Result};
use tubely_core::Config;
use tubely_storage::factory::create_local_storage;
use tubely_storage::{create_storage, LocalStorage, Storage, StorageBackend};

/// Build the configured backend. The local backend is also returned on its own
/// so the assets route can verify signatures and stream objects.
pub async fn setup_storage(
    config: &Config,
) -> Result<(Arc<dyn Storage>, Option<Arc<LocalStorage>>)> {
    match config.storage_backend() {
        StorageBackend::Local => {
            let local = Arc::new(
                create_local_storage(config)
                    .await
                    .context("Failed to initialize local storage")?,
            );
            let storage: Arc<dyn Storage> = local.clone();
            Ok((storage, Some(local)))
        }
        StorageBackend::S3 => {
            let storage = create_storage(config)
                .await
                .context("Failed to initialize S3 storage")?;
            Ok((storage, None))
        }
    }
}
