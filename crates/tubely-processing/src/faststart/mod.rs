//! Fast-start rewriting: place the movie index (`moov`) before the media
//! payload (`mdat`) so playback can begin before the whole file arrives.

mod ffmpeg;
mod native;

pub use ffmpeg::FfmpegFastStart;
pub use native::Mp4FastStart;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tubely_core::{IngestConfig, MediaToolBackend};

use crate::error::RewriteError;
use crate::staging::ScratchFile;

/// The rewritten video, owned exclusively and deleted on drop.
#[derive(Debug)]
pub struct ProcessedAsset {
    scratch: ScratchFile,
}

impl ProcessedAsset {
    pub(crate) fn new(scratch: ScratchFile) -> Self {
        Self { scratch }
    }

    pub fn path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn size(&self) -> u64 {
        self.scratch.size()
    }

    pub fn close(self) {
        self.scratch.close()
    }
}

#[async_trait]
pub trait FastStartRewriter: Send + Sync {
    /// Write a fast-start copy of `input` to a new scratch file. `input` is
    /// never modified.
    async fn rewrite(&self, input: &Path) -> Result<ProcessedAsset, RewriteError>;
}

/// Build the rewriter selected by `MEDIA_TOOL_BACKEND`.
pub fn create_rewriter(config: &IngestConfig) -> Arc<dyn FastStartRewriter> {
    match config.media_tool_backend {
        MediaToolBackend::Native => Arc::new(Mp4FastStart::new(
            config.media_tool_timeout,
            config.scratch_dir.clone(),
        )),
        MediaToolBackend::Ffmpeg => Arc::new(FfmpegFastStart::new(
            config.ffmpeg_path.clone(),
            config.media_tool_timeout,
            config.scratch_dir.clone(),
        )),
    }
}
