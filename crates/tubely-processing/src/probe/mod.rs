//! Container probing: display dimensions and orientation of a staged video.

mod ffprobe;
mod native;

pub use ffprobe::FfprobeProber;
pub use native::Mp4Prober;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tubely_core::{IngestConfig, MediaToolBackend, Orientation};

use crate::error::ProbeError;

/// Dimensions of the primary video stream and the orientation they classify as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

impl ProbeResult {
    pub fn from_dimensions(width: u32, height: u32) -> Result<Self, ProbeError> {
        if width == 0 || height == 0 {
            return Err(ProbeError::ZeroDimension { width, height });
        }
        Ok(Self {
            width,
            height,
            orientation: Orientation::classify(width, height),
        })
    }
}

#[async_trait]
pub trait VideoProber: Send + Sync {
    /// Inspect the file at `path`. Never falls back to a default orientation.
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;
}

/// Build the prober selected by `MEDIA_TOOL_BACKEND`.
pub fn create_prober(config: &IngestConfig) -> Arc<dyn VideoProber> {
    match config.media_tool_backend {
        MediaToolBackend::Native => Arc::new(Mp4Prober::new(config.media_tool_timeout)),
        MediaToolBackend::Ffmpeg => Arc::new(FfprobeProber::new(
            config.ffprobe_path.clone(),
            config.media_tool_timeout,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_on_construction() {
        let result = ProbeResult::from_dimensions(1920, 1080).unwrap();
        assert_eq!(result.orientation, Orientation::Landscape);

        let result = ProbeResult::from_dimensions(1080, 1920).unwrap();
        assert_eq!(result.orientation, Orientation::Portrait);

        let result = ProbeResult::from_dimensions(1000, 1000).unwrap();
        assert_eq!(result.orientation, Orientation::Other);
    }

    #[test]
    fn zero_dimension_is_an_error() {
        assert!(matches!(
            ProbeResult::from_dimensions(1920, 0),
            Err(ProbeError::ZeroDimension { .. })
        ));
        assert!(ProbeResult::from_dimensions(0, 1080).is_err());
    }
}
