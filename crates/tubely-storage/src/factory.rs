#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
#[cfg(feature = "storage-local")]
use crate::UrlSigner;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use tubely_core::Config;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint().map(String::from);

            tracing::info!(bucket = %bucket, region = %region, "Using S3 storage backend");
            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let storage = create_local_storage(config).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

/// Build the local backend; the API also needs its signer to verify asset URLs.
#[cfg(feature = "storage-local")]
pub async fn create_local_storage(config: &Config) -> StorageResult<LocalStorage> {
    let base_path = config.local_storage_path().map(String::from).ok_or_else(|| {
        StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
    })?;
    let base_url = config
        .local_storage_base_url()
        .map(String::from)
        .ok_or_else(|| {
            StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
        })?;

    tracing::info!(path = %base_path, "Using local storage backend");
    LocalStorage::new(
        base_path,
        base_url,
        UrlSigner::new(config.storage_signing_secret()),
    )
    .await
}
