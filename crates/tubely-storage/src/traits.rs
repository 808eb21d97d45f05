//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::keys::{ObjectReference, StorageKey};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// HTTP attributes stored with an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttributes {
    pub content_type: String,
    pub cache_control: String,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// A stored object opened for reading
pub struct StoredObject {
    pub size: u64,
    pub attributes: Option<ObjectAttributes>,
    pub stream: ByteStream,
}

/// Storage abstraction trait
///
/// The ingest pipeline hands processed files to a backend through this trait
/// and never sees backend specifics. Keys must come from [`crate::keys::classify`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Bucket name recorded in object references
    fn bucket(&self) -> &str;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Upload a local file under `key` without buffering it whole.
    ///
    /// `content_type` and `cache_control` are stored with the object and
    /// returned on retrieval. Uploading identical bytes to the same key again
    /// leaves the same object. On error no partial object is left visible.
    async fn upload_file(
        &self,
        path: &Path,
        key: &StorageKey,
        content_type: &str,
        cache_control: &str,
    ) -> StorageResult<ObjectReference>;

    /// Issue a time-limited URL granting read access to the referenced object.
    ///
    /// Pure with respect to the stored object: no network round trip is
    /// required and the object is not checked for existence.
    async fn signed_url(
        &self,
        reference: &ObjectReference,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Open an object as a stream of chunks
    async fn download_stream(&self, storage_key: &str) -> StorageResult<StoredObject>;
}
