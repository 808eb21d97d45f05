use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tubely_core::constants::PROCESSED_SCRATCH_PREFIX;

use super::{FastStartRewriter, ProcessedAsset};
use crate::error::{stderr_tail, RewriteError};
use crate::staging::ScratchFile;

/// Rewriter that remuxes with `ffmpeg -movflags faststart`, copying streams.
#[derive(Debug, Clone)]
pub struct FfmpegFastStart {
    ffmpeg_path: String,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl FfmpegFastStart {
    pub fn new(ffmpeg_path: String, timeout: Duration, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_path,
            timeout,
            scratch_dir,
        }
    }
}

#[async_trait]
impl FastStartRewriter for FfmpegFastStart {
    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "faststart"
    ))]
    async fn rewrite(&self, input: &Path) -> Result<ProcessedAsset, RewriteError> {
        let start = std::time::Instant::now();
        let mut scratch = ScratchFile::create(PROCESSED_SCRATCH_PREFIX, self.scratch_dir.as_deref())?;

        let child = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-i"])
            .arg(input)
            .args(["-c", "copy", "-movflags", "faststart", "-f", "mp4"])
            .arg(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RewriteError::Spawn {
                tool: self.ffmpeg_path.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RewriteError::Timeout(self.timeout))?
            .map_err(|source| RewriteError::Spawn {
                tool: self.ffmpeg_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RewriteError::ToolFailed {
                tool: self.ffmpeg_path.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let size = tokio::fs::metadata(scratch.path()).await?.len();
        scratch.set_size(size);

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            bytes = size,
            "Fast-start remux completed"
        );
        Ok(ProcessedAsset::new(scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_binary_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let rewriter = FfmpegFastStart::new(
            "/nonexistent/tubely-ffmpeg".to_string(),
            Duration::from_secs(5),
            Some(dir.path().to_path_buf()),
        );

        let err = rewriter.rewrite(Path::new("/tmp/in.mp4")).await.unwrap_err();
        assert!(matches!(err, RewriteError::Spawn { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_is_named_by_its_configured_path() {
        let dir = tempdir().unwrap();
        let rewriter = FfmpegFastStart::new(
            "false".to_string(),
            Duration::from_secs(5),
            Some(dir.path().to_path_buf()),
        );

        let err = rewriter.rewrite(Path::new("/tmp/in.mp4")).await.unwrap_err();
        assert!(matches!(err, RewriteError::ToolFailed { ref tool, .. } if tool == "false"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
