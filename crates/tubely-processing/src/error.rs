//! Stage errors and their mapping onto [`AppError`].

use std::io;
use std::time::Duration;

use thiserror::Error;
use tubely_core::AppError;
use tubely_storage::StorageError;

use crate::mp4::Mp4Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("upload exceeds the {limit} byte limit")]
    LimitExceeded { limit: u64 },

    #[error("failed to read upload body: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write scratch file: {0}")]
    Write(#[source] io::Error),

    #[error("upload cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// `tool` is the configured executable, here and in `ToolFailed`.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unparseable probe output: {0}")]
    Parse(String),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("invalid video dimensions {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Container(#[from] Mp4Error),

    #[error("probe task failed: {0}")]
    Task(String),

    #[error("probe aborted")]
    Aborted,
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Container(#[from] Mp4Error),

    #[error("failed to write processed file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("rewrite timed out after {0:?}")]
    Timeout(Duration),

    #[error("rewrite task failed: {0}")]
    Task(String),

    #[error("rewrite aborted")]
    Aborted,
}

impl From<StagingError> for AppError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::LimitExceeded { limit } => {
                AppError::PayloadTooLarge(format!("Video exceeds the maximum size of {} bytes", limit))
            }
            other => AppError::StagingFailed(other.to_string()),
        }
    }
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        AppError::ProbeFailed(err.to_string())
    }
}

impl From<RewriteError> for AppError {
    fn from(err: RewriteError) -> Self {
        AppError::RewriteFailed(err.to_string())
    }
}

/// Map a storage failure raised while handing off a processed video.
pub fn upload_error(err: StorageError) -> AppError {
    match err {
        StorageError::UnsupportedMediaType(content_type) => {
            AppError::InvalidContentType(format!("Unsupported content type: {}", content_type))
        }
        other => AppError::UploadFailed(other.to_string()),
    }
}

/// Keep only the tail of tool stderr for error messages.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    const MAX: usize = 512;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut start = text.len() - MAX;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
