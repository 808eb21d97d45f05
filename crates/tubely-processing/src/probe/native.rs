use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ProbeResult, VideoProber};
use crate::error::ProbeError;
use crate::mp4::{parse_boxes, read_payload, scan_boxes, video_dimensions, BoxType, Mp4Box, Mp4Error};

/// In-process prober reading the video track of an MP4 / QuickTime file.
#[derive(Debug, Clone)]
pub struct Mp4Prober {
    timeout: Duration,
}

impl Mp4Prober {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn probe_file(path: &Path, abort: &CancellationToken) -> Result<(u32, u32), ProbeError> {
    let file = File::open(path).map_err(Mp4Error::from)?;
    let len = file.metadata().map_err(Mp4Error::from)?.len();
    let mut reader = BufReader::new(file);

    let top = scan_boxes(&mut reader, 0, len)?;
    let moov = top
        .iter()
        .find(|h| h.box_type == BoxType::MOOV)
        .ok_or(Mp4Error::MissingBox("moov"))?;

    if abort.is_cancelled() {
        return Err(ProbeError::Aborted);
    }
    let payload = read_payload(&mut reader, moov)?;
    let moov = Mp4Box::Container {
        box_type: BoxType::MOOV,
        children: parse_boxes(&payload)?,
    };

    video_dimensions(&moov).ok_or(ProbeError::NoVideoStream)
}

#[async_trait]
impl VideoProber for Mp4Prober {
    #[tracing::instrument(skip(self), fields(probe.backend = "native"))]
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let start = std::time::Instant::now();
        let owned: PathBuf = path.to_path_buf();

        let abort = CancellationToken::new();
        let _abort_on_exit = abort.clone().drop_guard();
        let task = tokio::task::spawn_blocking(move || probe_file(&owned, &abort));
        let (width, height) = match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(|e| ProbeError::Task(e.to_string()))??,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Container probe timed out, aborting read");
                return Err(ProbeError::Timeout(self.timeout));
            }
        };

        let result = ProbeResult::from_dimensions(width, height)?;
        tracing::debug!(
            width,
            height,
            orientation = %result.orientation,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Container probe completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Mp4Fixture;
    use tempfile::tempdir;
    use tubely_core::Orientation;

    fn prober() -> Mp4Prober {
        Mp4Prober::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn probes_landscape_and_portrait() {
        let dir = tempdir().unwrap();

        let path = Mp4Fixture::new(1920, 1080).write_to(dir.path(), "landscape.mp4");
        let result = prober().probe(&path).await.unwrap();
        assert_eq!((result.width, result.height), (1920, 1080));
        assert_eq!(result.orientation, Orientation::Landscape);

        let path = Mp4Fixture::new(1080, 1920).moov_first().write_to(dir.path(), "portrait.mp4");
        let result = prober().probe(&path).await.unwrap();
        assert_eq!(result.orientation, Orientation::Portrait);
    }

    #[tokio::test]
    async fn square_is_other() {
        let dir = tempdir().unwrap();
        let path = Mp4Fixture::new(1000, 1000).write_to(dir.path(), "square.mp4");
        let result = prober().probe(&path).await.unwrap();
        assert_eq!(result.orientation, Orientation::Other);
    }

    #[tokio::test]
    async fn rotated_phone_video_is_portrait() {
        let dir = tempdir().unwrap();
        let path = Mp4Fixture::new(1920, 1080).rotated().write_to(dir.path(), "rotated.mp4");
        let result = prober().probe(&path).await.unwrap();
        assert_eq!((result.width, result.height), (1080, 1920));
        assert_eq!(result.orientation, Orientation::Portrait);
    }

    #[tokio::test]
    async fn audio_only_has_no_video_stream() {
        let dir = tempdir().unwrap();
        let path = Mp4Fixture::new(640, 480).audio_only().write_to(dir.path(), "audio.mp4");
        let err = prober().probe(&path).await.unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[tokio::test]
    async fn garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.mp4");
        std::fs::write(&path, b"definitely not an mp4 file").unwrap();
        let err = prober().probe(&path).await.unwrap_err();
        assert!(matches!(err, ProbeError::Container(_)));
    }

    #[tokio::test]
    async fn missing_moov_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no-moov.mp4");
        let mut data = crate::fixtures::raw_box(b"ftyp", b"isom");
        data.extend(crate::fixtures::raw_box(b"mdat", &[0u8; 32]));
        std::fs::write(&path, data).unwrap();

        let err = prober().probe(&path).await.unwrap_err();
        assert!(matches!(err, ProbeError::Container(Mp4Error::MissingBox("moov"))));
    }

    #[test]
    fn aborted_probe_stops_before_reading_moov() {
        let dir = tempdir().unwrap();
        let path = Mp4Fixture::new(1920, 1080).write_to(dir.path(), "in.mp4");
        let abort = CancellationToken::new();
        abort.cancel();

        let err = probe_file(&path, &abort).unwrap_err();
        assert!(matches!(err, ProbeError::Aborted));
    }
}
