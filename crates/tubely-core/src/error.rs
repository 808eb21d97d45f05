//! Error types module
//!
//! All failures of the ingest service are unified under [`AppError`]. Each
//! variant self-describes how it is presented to clients through
//! [`ErrorMetadata`].
//!
//! The `Database` variant wraps `sqlx::Error` when the `sqlx` feature is on and
//! falls back to a plain message otherwise.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected failures such as validation errors
    Debug,
    /// Recoverable issues and rejected media
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses.
///
/// Lets errors describe their HTTP response characteristics without the API
/// layer knowing every variant.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "UPLOAD_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether the client may retry the same request
    fn is_recoverable(&self) -> bool;

    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message. Never contains file paths or tool output.
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Missing or invalid credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential, but the principal does not own the record
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Staging failed: {0}")]
    StagingFailed(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Rewrite failed: {0}")]
    RewriteFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// The object was stored but the record could not be updated; the
    /// object at `storage_key` is orphaned.
    #[error("Metadata update failed for stored object {storage_key}: {message}")]
    MetadataUpdateFailed {
        storage_key: String,
        message: String,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata per variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Check the authentication token"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotAuthorized(_) => (
            403,
            "NOT_AUTHORIZED",
            false,
            Some("Only the owner of a video can modify it"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidContentType(_) => (
            415,
            "INVALID_CONTENT_TYPE",
            false,
            Some("Upload an MP4 video"),
            false,
            LogLevel::Debug,
        ),
        AppError::StagingFailed(_) => (
            500,
            "STAGING_FAILED",
            true,
            Some("Retry the upload"),
            true,
            LogLevel::Error,
        ),
        AppError::ProbeFailed(_) => (
            422,
            "PROBE_FAILED",
            false,
            Some("Check that the file is a valid video"),
            true,
            LogLevel::Warn,
        ),
        AppError::RewriteFailed(_) => (
            422,
            "REWRITE_FAILED",
            false,
            Some("Check that the file is a valid, non-fragmented MP4"),
            true,
            LogLevel::Warn,
        ),
        AppError::UploadFailed(_) => (
            502,
            "UPLOAD_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::MetadataUpdateFailed { .. } => (
            500,
            "METADATA_UPDATE_FAILED",
            true,
            Some("Retry the upload"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
            AppError::Unauthorized(_) => "AuthFailed",
            AppError::NotAuthorized(_) => "NotAuthorized",
            AppError::InvalidContentType(_) => "InvalidContentType",
            AppError::StagingFailed(_) => "StagingFailed",
            AppError::ProbeFailed(_) => "ProbeFailed",
            AppError::RewriteFailed(_) => "RewriteFailed",
            AppError::UploadFailed(_) => "UploadFailed",
            AppError::MetadataUpdateFailed { .. } => "MetadataUpdateFailed",
        }
    }

    /// Storage key of an object left without a record reference, if any.
    pub fn orphaned_storage_key(&self) -> Option<&str> {
        match self {
            AppError::MetadataUpdateFailed { storage_key, .. } => Some(storage_key),
            _ => None,
        }
    }

    /// Detailed error information including the source chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::NotAuthorized(ref msg) => msg.clone(),
            AppError::InvalidContentType(ref msg) => msg.clone(),
            AppError::StagingFailed(_) => "Failed to receive video".to_string(),
            AppError::ProbeFailed(_) => "Could not read video dimensions".to_string(),
            AppError::RewriteFailed(_) => "Could not prepare video for streaming".to_string(),
            AppError::UploadFailed(_) => "Failed to store video".to_string(),
            AppError::MetadataUpdateFailed { .. } => "Failed to update video".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_auth_errors_are_distinct() {
        let unauthenticated = AppError::Unauthorized("Missing bearer token".to_string());
        assert_eq!(unauthenticated.http_status_code(), 401);
        assert_eq!(unauthenticated.error_code(), "UNAUTHORIZED");

        let forbidden = AppError::NotAuthorized("Not the owner".to_string());
        assert_eq!(forbidden.http_status_code(), 403);
        assert_eq!(forbidden.error_code(), "NOT_AUTHORIZED");
        assert_eq!(forbidden.client_message(), "Not the owner");
    }

    #[test]
    fn test_pipeline_error_statuses() {
        let cases = [
            (AppError::InvalidContentType("image/gif".into()), 415, "INVALID_CONTENT_TYPE"),
            (AppError::StagingFailed("disk full".into()), 500, "STAGING_FAILED"),
            (AppError::ProbeFailed("no video stream".into()), 422, "PROBE_FAILED"),
            (AppError::RewriteFailed("missing moov".into()), 422, "REWRITE_FAILED"),
            (AppError::UploadFailed("timeout".into()), 502, "UPLOAD_FAILED"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.http_status_code(), status, "{}", err.error_type());
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_client_message_hides_internals() {
        let err = AppError::ProbeFailed("ffprobe exited: /tmp/tubely-upload-abc".to_string());
        assert!(!err.client_message().contains("/tmp"));

        let err = AppError::StagingFailed("write /var/scratch/x failed".to_string());
        assert!(!err.client_message().contains("/var"));
    }

    #[test]
    fn test_media_tool_errors_are_sensitive() {
        assert!(AppError::ProbeFailed("ffprobe: /tmp/x".to_string()).is_sensitive());
        assert!(AppError::RewriteFailed("ffmpeg: /tmp/x".to_string()).is_sensitive());
        assert!(!AppError::InvalidContentType("image/gif".to_string()).is_sensitive());
    }

    #[test]
    fn test_metadata_update_failed_carries_orphaned_key() {
        let err = AppError::MetadataUpdateFailed {
            storage_key: "landscape/0123abcd.mp4".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "METADATA_UPDATE_FAILED");
        assert_eq!(err.orphaned_storage_key(), Some("landscape/0123abcd.mp4"));
        assert!(err.to_string().contains("landscape/0123abcd.mp4"));
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("inner").context("outer"));
        let details = err.detailed_message();
        assert!(details.contains("Caused by"));
    }
}
