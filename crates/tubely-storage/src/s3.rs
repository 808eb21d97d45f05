use crate::keys::{ObjectReference, StorageKey};
use crate::traits::{ObjectAttributes, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutMultipartOptions, WriteMultipart,
};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Size of each uploaded part
const PART_SIZE: usize = 8 * 1024 * 1024;
/// Parts in flight per upload
const MAX_CONCURRENT_PARTS: usize = 4;
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        // Credentials come from the environment (AWS_ACCESS_KEY_ID, ...).
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    async fn stream_file(
        &self,
        path: &Path,
        location: &ObjectPath,
        attributes: Attributes,
    ) -> StorageResult<u64> {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to open processed file: {}", e))
        })?;

        let opts = PutMultipartOptions {
            attributes,
            ..Default::default()
        };
        let upload = self
            .store
            .put_multipart_opts(location, opts)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(read) => read,
                Err(e) => {
                    abort_upload(writer, location).await;
                    return Err(StorageError::UploadFailed(format!(
                        "Failed to read processed file: {}",
                        e
                    )));
                }
            };
            if read == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                abort_upload(writer, location).await;
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            writer.write(&buffer[..read]);
            total += read as u64;
        }

        writer
            .finish()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        Ok(total)
    }
}

async fn abort_upload(writer: WriteMultipart, location: &ObjectPath) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(error = %e, key = %location, "Failed to abort multipart upload");
    }
}

fn object_attributes(content_type: &str, cache_control: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type.to_string().into());
    attributes.insert(Attribute::CacheControl, cache_control.to_string().into());
    attributes
}

fn read_attributes(attributes: &Attributes) -> Option<ObjectAttributes> {
    let content_type = attributes.get(&Attribute::ContentType)?;
    Some(ObjectAttributes {
        content_type: content_type.to_string(),
        cache_control: attributes
            .get(&Attribute::CacheControl)
            .map(|v| v.to_string())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl Storage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &StorageKey,
        content_type: &str,
        cache_control: &str,
    ) -> StorageResult<ObjectReference> {
        let location = ObjectPath::from(key.as_str());
        let start = std::time::Instant::now();

        let size = self
            .stream_file(path, &location, object_attributes(content_type, cache_control))
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                e
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(ObjectReference::new(self.bucket.clone(), key.as_str()))
    }

    async fn signed_url(
        &self,
        reference: &ObjectReference,
        expires_in: Duration,
    ) -> StorageResult<String> {
        if reference.bucket != self.bucket {
            return Err(StorageError::InvalidReference(format!(
                "bucket {} is not the configured bucket",
                reference.bucket
            )));
        }

        let location = ObjectPath::from(reference.key.as_str());
        let url = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(url.to_string())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let location = ObjectPath::from(storage_key);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn download_stream(&self, storage_key: &str) -> StorageResult<StoredObject> {
        let start = std::time::Instant::now();
        let location = ObjectPath::from(storage_key);

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let size = result.meta.size;
        let attributes = read_attributes(&result.attributes);
        let bucket = self.bucket.clone();
        let key = storage_key.to_string();

        let stream = result.into_stream().map(move |res| {
            res.map_err(|e| {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok(StoredObject {
            size,
            attributes,
            stream: Box::pin(stream),
        })
    }
}
