use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{ProbeResult, VideoProber};
use crate::error::{stderr_tail, ProbeError};

/// Prober that shells out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: String, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    fn rotation(&self) -> i64 {
        let from_side_data = self
            .side_data_list
            .iter()
            .find_map(|s| s.rotation)
            .map(|r| r.round() as i64);
        let from_tags = self
            .tags
            .as_ref()
            .and_then(|t| t.rotate.as_deref())
            .and_then(|r| r.trim().parse::<i64>().ok());
        from_side_data.or(from_tags).unwrap_or(0)
    }
}

/// Display dimensions of the first video stream in `ffprobe -print_format json` output.
///
/// Quarter-turn rotations swap width and height.
pub(crate) fn parse_ffprobe_output(stdout: &[u8]) -> Result<(u32, u32), ProbeError> {
    let output: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let stream = output.streams.first().ok_or(ProbeError::NoVideoStream)?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(ProbeError::Parse("video stream has no dimensions".to_string())),
    };

    if stream.rotation().rem_euclid(180) == 90 {
        Ok((height, width))
    } else {
        Ok((width, height))
    }
}

#[async_trait]
impl VideoProber for FfprobeProber {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let start = std::time::Instant::now();

        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                tool: self.ffprobe_path.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(|source| ProbeError::Spawn {
                tool: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::ToolFailed {
                tool: self.ffprobe_path.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let (width, height) = parse_ffprobe_output(&output.stdout)?;
        let result = ProbeResult::from_dimensions(width, height)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            width,
            height,
            orientation = %result.orientation,
            "Video probe completed"
        );
        Ok(result)
    }
}
