//! Temporary staging of upload bodies.
//!
//! Every scratch file is a [`NamedTempFile`]: it is removed when its owner is
//! dropped, whether the request succeeded, failed, panicked or was cancelled.

use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tubely_core::constants::UPLOAD_SCRATCH_PREFIX;

use crate::error::StagingError;

const STAGING_BUFFER_SIZE: usize = 256 * 1024;

/// Exclusively owned scratch file, deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
    size: u64,
}

impl ScratchFile {
    /// Create an empty private file named `{prefix}XXXX` in `dir`, or the
    /// system temp directory when `dir` is `None`.
    pub(crate) fn create(prefix: &str, dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(Self { file, size: 0 })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub(crate) fn as_file(&self) -> &std::fs::File {
        self.file.as_file()
    }

    /// Remove the file now, logging a removal failure instead of returning it.
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove scratch file");
        }
    }
}

/// The upload body, fully written and synced to a scratch file.
#[derive(Debug)]
pub struct StagedAsset {
    scratch: ScratchFile,
}

impl StagedAsset {
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

/// Copy at most `limit` bytes from `reader` into a fresh scratch file.
///
/// Reading stops with [`StagingError::LimitExceeded`] before any byte past
/// the limit is written. On any error the partial file is removed.
#[tracing::instrument(skip(reader, cancel), fields(staging.limit = limit))]
pub async fn stage<R>(
    mut reader: R,
    limit: u64,
    scratch_dir: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<StagedAsset, StagingError>
where
    R: AsyncRead + Unpin,
{
    let mut scratch =
        ScratchFile::create(UPLOAD_SCRATCH_PREFIX, scratch_dir).map_err(StagingError::Write)?;
    let handle = scratch.as_file().try_clone().map_err(StagingError::Write)?;
    let mut file = tokio::fs::File::from_std(handle);

    let mut buf = vec![0u8; STAGING_BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StagingError::Cancelled),
            read = reader.read(&mut buf) => read.map_err(StagingError::Read)?,
        };
        if n == 0 {
            break;
        }
        if written + n as u64 > limit {
            tracing::warn!(limit, received = written + n as u64, "Upload exceeds size limit");
            return Err(StagingError::LimitExceeded { limit });
        }
        file.write_all(&buf[..n]).await.map_err(StagingError::Write)?;
        written += n as u64;
    }

    file.flush().await.map_err(StagingError::Write)?;
    file.sync_all().await.map_err(StagingError::Write)?;
    file.rewind().await.map_err(StagingError::Write)?;

    scratch.set_size(written);
    tracing::debug!(bytes = written, path = %scratch.path().display(), "Upload staged");

    Ok(StagedAsset { scratch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::tempdir;
    use tokio::io::ReadBuf;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")))
        }
    }

    #[tokio::test]
    async fn stages_body_and_removes_on_drop() {
        let dir = tempdir().unwrap();
        let body = vec![7u8; 1000];

        let staged = stage(body.as_slice(), 1000, Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(staged.size(), 1000);
        assert_eq!(std::fs::read(staged.path()).unwrap(), body);

        let name = staged.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(UPLOAD_SCRATCH_PREFIX));

        drop(staged);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn close_removes_file() {
        let dir = tempdir().unwrap();
        let staged = stage(&b"abc"[..], 10, Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        staged.close();
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn limit_exceeded_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let body = vec![0u8; 1001];

        let err = stage(body.as_slice(), 1000, Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::LimitExceeded { limit: 1000 }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn empty_body_is_staged() {
        let dir = tempdir().unwrap();
        let staged = stage(&b""[..], 10, Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(staged.size(), 0);
    }

    #[tokio::test]
    async fn read_error_is_reported() {
        let dir = tempdir().unwrap();
        let err = stage(FailingReader, 10, Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Read(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_upload_is_discarded() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (_tx, rx) = tokio::io::duplex(64);
        let err = stage(rx, 10, Some(dir.path()), &cancel).await.unwrap_err();
        assert!(matches!(err, StagingError::Cancelled));
        assert_eq!(entries(dir.path()), 0);
    }
}
