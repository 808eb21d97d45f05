//! Tubely video processing
//!
//! The ingest pipeline and its stages: temporary staging of the upload,
//! container probing for orientation, fast-start rewriting and the handoff to
//! object storage.

pub mod error;
pub mod faststart;
pub mod ingest;
pub mod mp4;
pub mod probe;
pub mod staging;

#[cfg(any(test, feature = "test-helpers"))]
pub mod fixtures;

pub use error::{ProbeError, RewriteError, StagingError};
pub use faststart::{create_rewriter, FastStartRewriter, FfmpegFastStart, Mp4FastStart, ProcessedAsset};
pub use ingest::{UploadRequest, VideoIngestPipeline};
pub use probe::{create_prober, FfprobeProber, Mp4Prober, ProbeResult, VideoProber};
pub use staging::{stage, ScratchFile, StagedAsset};
