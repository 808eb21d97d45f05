use crate::keys::{ObjectReference, StorageKey};
use crate::signing::UrlSigner;
use crate::traits::{ObjectAttributes, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Bucket name recorded for objects on the local filesystem
pub const LOCAL_BUCKET: &str = "local";

const ATTRIBUTES_SUFFIX: &str = ".attrs.json";

/// Local filesystem storage implementation
///
/// Objects are served back by the application under `base_url`, guarded by
/// HMAC-signed URLs.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    signer: UrlSigner,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for stored videos (e.g., "/var/lib/tubely/videos")
    /// * `base_url` - Base URL the assets route is mounted at (e.g., "http://localhost:8091/assets")
    /// * `signer` - Signs the URLs returned by [`Storage::signed_url`]
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        signer: UrlSigner,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            signer,
        })
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Convert storage key to filesystem path, rejecting keys that would
    /// escape the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty()
            || storage_key.starts_with('/')
            || storage_key.contains('\\')
            || storage_key.split('/').any(|segment| segment == ".." || segment == ".")
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn attributes_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(ATTRIBUTES_SUFFIX);
        PathBuf::from(name)
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".partial-{}", hex::encode(rand::random::<[u8; 8]>())));
        PathBuf::from(name)
    }

    async fn write_object(
        &self,
        source: &Path,
        partial: &Path,
        attributes: &ObjectAttributes,
        final_path: &Path,
    ) -> StorageResult<u64> {
        let mut input = fs::File::open(source).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to open {}: {}", source.display(), e))
        })?;
        let mut output = fs::File::create(partial).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create {}: {}", partial.display(), e))
        })?;

        let size = tokio::io::copy(&mut input, &mut output).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write {}: {}", partial.display(), e))
        })?;
        output.flush().await?;
        output.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync {}: {}", partial.display(), e))
        })?;

        let encoded = serde_json::to_vec(attributes)
            .map_err(|e| StorageError::UploadFailed(format!("Failed to encode attributes: {}", e)))?;
        fs::write(Self::attributes_path(final_path), encoded)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to write attributes: {}", e)))?;

        fs::rename(partial, final_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to move object into place at {}: {}",
                final_path.display(),
                e
            ))
        })?;

        Ok(size)
    }

    async fn remove_leftover(path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %path.display(), "Failed to remove partial upload");
            }
        }
    }

    async fn read_attributes(path: &Path) -> Option<ObjectAttributes> {
        let raw = fs::read(Self::attributes_path(path)).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn bucket(&self) -> &str {
        LOCAL_BUCKET
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &StorageKey,
        content_type: &str,
        cache_control: &str,
    ) -> StorageResult<ObjectReference> {
        let destination = self.key_to_path(key.as_str())?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let start = std::time::Instant::now();
        let partial = Self::partial_path(&destination);
        let attributes = ObjectAttributes {
            content_type: content_type.to_string(),
            cache_control: cache_control.to_string(),
        };

        let size = match self
            .write_object(path, &partial, &attributes, &destination)
            .await
        {
            Ok(size) => size,
            Err(e) => {
                Self::remove_leftover(&partial).await;
                // Attributes are written before the rename; drop them unless an
                // object is already in place under this key.
                let object_in_place = fs::metadata(&destination)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if !object_in_place {
                    Self::remove_leftover(&Self::attributes_path(&destination)).await;
                }
                tracing::error!(
                    error = %e,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage upload failed"
                );
                return Err(e);
            }
        };

        tracing::info!(
            path = %destination.display(),
            key = %key,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(ObjectReference::new(LOCAL_BUCKET, key.as_str()))
    }

    async fn signed_url(
        &self,
        reference: &ObjectReference,
        expires_in: Duration,
    ) -> StorageResult<String> {
        if reference.bucket != LOCAL_BUCKET {
            return Err(StorageError::InvalidReference(format!(
                "bucket {} is not served by local storage",
                reference.bucket
            )));
        }
        self.key_to_path(&reference.key)?;
        Ok(self
            .signer
            .signed_url(&self.base_url, &reference.key, expires_in))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<StoredObject> {
        let path = self.key_to_path(storage_key)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let size = file.metadata().await?.len();
        let attributes = Self::read_attributes(&path).await;

        let stream = ReaderStream::new(file)
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));

        Ok(StoredObject {
            size,
            attributes,
            stream: Box::pin(stream),
        })
    }
}
