use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tubely_core::constants::PROCESSED_SCRATCH_PREFIX;

use super::{FastStartRewriter, ProcessedAsset};
use crate::error::RewriteError;
use crate::mp4::{
    parse_boxes, read_payload, scan_boxes, visit_chunk_offsets_mut, BoxHeader, BoxType, Mp4Box,
    Mp4Error,
};
use crate::staging::ScratchFile;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// In-process structural remux of MP4 / QuickTime files.
///
/// Top-level boxes are re-emitted in their original order with `moov` moved
/// in front of the first `mdat`; every chunk offset is remapped to the new
/// position of the byte it addressed.
#[derive(Debug, Clone)]
pub struct Mp4FastStart {
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl Mp4FastStart {
    pub fn new(timeout: Duration, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            timeout,
            scratch_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Copy a top-level box verbatim from the input.
    Copy(BoxHeader),
    /// Emit the patched movie box.
    Moov,
}

#[derive(Debug)]
pub(crate) struct RewritePlan {
    pub segments: Vec<Segment>,
    pub moov: Mp4Box,
    /// 32-bit chunk offset tables were widened to `co64`.
    pub promoted: bool,
}

impl RewritePlan {
    fn output_size(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Copy(h) => h.size,
                Segment::Moov => self.moov.size(),
            })
            .sum()
    }
}

/// Index of the movie box and of the first media data box.
fn locate(headers: &[BoxHeader]) -> Result<(usize, usize), Mp4Error> {
    let moov = headers
        .iter()
        .position(|h| h.box_type == BoxType::MOOV)
        .ok_or(Mp4Error::MissingBox("moov"))?;
    let mdat = headers
        .iter()
        .position(|h| h.box_type == BoxType::MDAT)
        .ok_or(Mp4Error::MissingBox("mdat"))?;
    Ok((moov, mdat))
}

fn is_fast_start(headers: &[BoxHeader]) -> Result<bool, Mp4Error> {
    let (moov, mdat) = locate(headers)?;
    Ok(moov < mdat)
}

/// Work out the output layout for a moov-after-mdat file.
///
/// Table sizes only depend on entry width and count, so the moov size is
/// known before any offset is patched. When a 32-bit offset overflows, every
/// `stco` is widened and the layout recomputed once.
pub(crate) fn plan_rewrite(
    headers: &[BoxHeader],
    moov_children: Vec<Mp4Box>,
) -> Result<RewritePlan, Mp4Error> {
    let (moov_idx, mdat_idx) = locate(headers)?;

    if moov_children.iter().any(|b| b.box_type() == BoxType::CMOV) {
        return Err(Mp4Error::Unsupported("compressed movie box".to_string()));
    }
    if headers.iter().any(|h| h.box_type == BoxType::MOOF) {
        return Err(Mp4Error::Unsupported(
            "fragmented file with a trailing movie box".to_string(),
        ));
    }

    let mut segments = Vec::with_capacity(headers.len());
    for (i, header) in headers.iter().enumerate() {
        if i == mdat_idx {
            segments.push(Segment::Moov);
        }
        if i != moov_idx {
            segments.push(Segment::Copy(*header));
        }
    }

    let mut promote = false;
    loop {
        let mut children = moov_children.clone();
        if promote {
            visit_chunk_offsets_mut(&mut children, &mut |table| table.wide = true);
        }
        let mut moov = Mp4Box::Container {
            box_type: BoxType::MOOV,
            children,
        };
        let moov_size = moov.size();

        // (old box, new start) for every box that holds media data
        let mut relocations = Vec::with_capacity(segments.len());
        let mut position = 0u64;
        for segment in &segments {
            match segment {
                Segment::Copy(h) => {
                    relocations.push((*h, position));
                    position += h.size;
                }
                Segment::Moov => position += moov_size,
            }
        }

        let mut outside = None;
        let mut overflow = false;
        visit_chunk_offsets_mut(std::slice::from_mut(&mut moov), &mut |table| {
            for offset in table.offsets.iter_mut() {
                match relocations.iter().find(|(h, _)| h.contains(*offset)) {
                    Some((h, start)) => *offset = start + (*offset - h.offset),
                    None => outside = outside.or(Some(*offset)),
                }
            }
            overflow |= !table.fits();
        });

        if let Some(offset) = outside {
            return Err(Mp4Error::corrupt(
                "stco",
                headers[moov_idx].offset,
                format!("chunk offset {} lies outside every top-level box", offset),
            ));
        }
        if overflow && !promote {
            promote = true;
            continue;
        }

        return Ok(RewritePlan {
            segments,
            moov,
            promoted: promote,
        });
    }
}

/// Copy `len` bytes starting at `offset`, checking `abort` between buffers.
fn copy_range<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
    offset: u64,
    len: u64,
    abort: &CancellationToken,
) -> Result<(), RewriteError> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        if abort.is_cancelled() {
            return Err(RewriteError::Aborted);
        }
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "input ended after {} of {} bytes at offset {}",
                    len - remaining,
                    len,
                    offset
                ),
            )
            .into());
        }
        writer.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

fn rewrite_file(
    input: &Path,
    scratch_dir: Option<&Path>,
    abort: &CancellationToken,
) -> Result<ScratchFile, RewriteError> {
    let file = File::open(input)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, file);

    let headers = scan_boxes(&mut reader, 0, len)?;

    let mut scratch = ScratchFile::create(PROCESSED_SCRATCH_PREFIX, scratch_dir)?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, scratch.as_file().try_clone()?);

    let written = if is_fast_start(&headers)? {
        tracing::debug!("Input already has moov before mdat, copying unchanged");
        copy_range(&mut reader, &mut writer, 0, len, abort)?;
        len
    } else {
        let moov_header = headers
            .iter()
            .find(|h| h.box_type == BoxType::MOOV)
            .ok_or(Mp4Error::MissingBox("moov"))?;
        let moov_children = parse_boxes(&read_payload(&mut reader, moov_header)?)?;
        let plan = plan_rewrite(&headers, moov_children)?;

        if plan.promoted {
            tracing::info!("Chunk offsets exceed 32 bits, promoted stco to co64");
        }

        for segment in &plan.segments {
            match segment {
                Segment::Copy(h) => copy_range(&mut reader, &mut writer, h.offset, h.size, abort)?,
                Segment::Moov => plan.moov.write_to(&mut writer)?,
            }
        }
        plan.output_size()
    };

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    scratch.set_size(written);
    Ok(scratch)
}

#[async_trait]
impl FastStartRewriter for Mp4FastStart {
    #[tracing::instrument(skip(self), fields(rewrite.backend = "native"))]
    async fn rewrite(&self, input: &Path) -> Result<ProcessedAsset, RewriteError> {
        let start = std::time::Instant::now();
        let input = input.to_path_buf();
        let scratch_dir = self.scratch_dir.clone();

        // The blocking copy outlives an expired timeout; the guard stops it
        // at the next buffer so its scratch file is dropped.
        let abort = CancellationToken::new();
        let _abort_on_exit = abort.clone().drop_guard();
        let task = tokio::task::spawn_blocking(move || {
            rewrite_file(&input, scratch_dir.as_deref(), &abort)
        });
        let scratch = match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(|e| RewriteError::Task(e.to_string()))??,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Fast-start rewrite timed out, aborting copy");
                return Err(RewriteError::Timeout(self.timeout));
            }
        };

        tracing::debug!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            bytes = scratch.size(),
            "Fast-start rewrite completed"
        );
        Ok(ProcessedAsset::new(scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{chunk_payload, read_chunks, top_level_types, Mp4Fixture};
    use crate::mp4::ChunkOffsetTable;
    use tempfile::tempdir;

    fn rewriter(dir: &Path) -> Mp4FastStart {
        Mp4FastStart::new(Duration::from_secs(5), Some(dir.to_path_buf()))
    }

    fn expected_chunks(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(chunk_payload).collect()
    }

    fn scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(PROCESSED_SCRATCH_PREFIX)
            })
            .count()
    }

    #[tokio::test]
    async fn moves_moov_before_mdat() {
        let dir = tempdir().unwrap();
        let input = Mp4Fixture::new(1920, 1080).chunks(5).write_to(dir.path(), "in.mp4");
        let original = std::fs::read(&input).unwrap();

        let processed = rewriter(dir.path()).rewrite(&input).await.unwrap();
        let output = std::fs::read(processed.path()).unwrap();

        assert_eq!(
            top_level_types(&output),
            vec![BoxType::FTYP, BoxType::MOOV, BoxType::MDAT]
        );
        assert_eq!(read_chunks(&output), expected_chunks(5));
        assert_eq!(processed.size(), output.len() as u64);
        assert_eq!(output.len(), original.len());

        // input untouched
        assert_eq!(std::fs::read(&input).unwrap(), original);
    }

    #[tokio::test]
    async fn keeps_other_boxes_in_order() {
        let dir = tempdir().unwrap();
        let input = Mp4Fixture::new(1080, 1920)
            .free_before_mdat()
            .write_to(dir.path(), "in.mp4");

        let processed = rewriter(dir.path()).rewrite(&input).await.unwrap();
        let output = std::fs::read(processed.path()).unwrap();

        assert_eq!(
            top_level_types(&output),
            vec![BoxType::FTYP, BoxType::FREE, BoxType::MOOV, BoxType::MDAT]
        );
        assert_eq!(read_chunks(&output), expected_chunks(3));
    }

    #[tokio::test]
    async fn keeps_wide_offset_tables() {
        let dir = tempdir().unwrap();
        let input = Mp4Fixture::new(1920, 1080).wide_offsets().write_to(dir.path(), "in.mp4");

        let processed = rewriter(dir.path()).rewrite(&input).await.unwrap();
        let output = std::fs::read(processed.path()).unwrap();
        assert_eq!(read_chunks(&output), expected_chunks(3));
    }

    #[tokio::test]
    async fn already_fast_start_is_copied_unchanged() {
        let dir = tempdir().unwrap();
        let input = Mp4Fixture::new(1920, 1080).moov_first().write_to(dir.path(), "in.mp4");

        let processed = rewriter(dir.path()).rewrite(&input).await.unwrap();
        assert_eq!(
            std::fs::read(processed.path()).unwrap(),
            std::fs::read(&input).unwrap()
        );
    }

    #[tokio::test]
    async fn unsupported_layouts_fail_without_leftovers() {
        let dir = tempdir().unwrap();

        let input = Mp4Fixture::new(1920, 1080).compressed_moov().write_to(dir.path(), "cmov.mp4");
        let err = rewriter(dir.path()).rewrite(&input).await.unwrap_err();
        assert!(matches!(err, RewriteError::Container(Mp4Error::Unsupported(_))));

        let input = Mp4Fixture::new(1920, 1080).fragmented().write_to(dir.path(), "frag.mp4");
        let err = rewriter(dir.path()).rewrite(&input).await.unwrap_err();
        assert!(matches!(err, RewriteError::Container(Mp4Error::Unsupported(_))));

        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[test]
    fn aborted_copy_stops_and_removes_scratch() {
        let dir = tempdir().unwrap();
        let abort = CancellationToken::new();
        abort.cancel();

        for input in [
            Mp4Fixture::new(1920, 1080).chunks(3).write_to(dir.path(), "tail.mp4"),
            Mp4Fixture::new(1920, 1080).moov_first().write_to(dir.path(), "fast.mp4"),
        ] {
            let err = rewrite_file(&input, Some(dir.path()), &abort).unwrap_err();
            assert!(matches!(err, RewriteError::Aborted));
        }
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn missing_mdat_fails() {
        let dir = tempdir().unwrap();
        let fixture = Mp4Fixture::new(1920, 1080);
        let mut data = crate::fixtures::raw_box(b"ftyp", b"isom");
        data.extend(fixture.moov_bytes());
        let input = dir.path().join("no-mdat.mp4");
        std::fs::write(&input, data).unwrap();

        let err = rewriter(dir.path()).rewrite(&input).await.unwrap_err();
        assert!(matches!(err, RewriteError::Container(Mp4Error::MissingBox("mdat"))));
    }

    #[tokio::test]
    async fn truncated_input_fails() {
        let dir = tempdir().unwrap();
        let mut data = Mp4Fixture::new(1920, 1080).build();
        data.truncate(data.len() - 10);
        let input = dir.path().join("truncated.mp4");
        std::fs::write(&input, data).unwrap();

        let err = rewriter(dir.path()).rewrite(&input).await.unwrap_err();
        assert!(matches!(err, RewriteError::Container(Mp4Error::CorruptBox { .. })));
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn dropping_processed_asset_removes_it() {
        let dir = tempdir().unwrap();
        let input = Mp4Fixture::new(1920, 1080).write_to(dir.path(), "in.mp4");
        let processed = rewriter(dir.path()).rewrite(&input).await.unwrap();
        assert_eq!(scratch_files(dir.path()), 1);
        drop(processed);
        assert_eq!(scratch_files(dir.path()), 0);
    }

    fn moov_with_table(table: ChunkOffsetTable) -> Vec<Mp4Box> {
        let stbl = Mp4Box::Container {
            box_type: BoxType::STBL,
            children: vec![Mp4Box::ChunkOffsets(table)],
        };
        let minf = Mp4Box::Container {
            box_type: BoxType::MINF,
            children: vec![stbl],
        };
        let mdia = Mp4Box::Container {
            box_type: BoxType::MDIA,
            children: vec![minf],
        };
        vec![
            Mp4Box::Leaf {
                box_type: BoxType(*b"mvhd"),
                payload: vec![0u8; 100],
            },
            Mp4Box::Container {
                box_type: BoxType::TRAK,
                children: vec![mdia],
            },
        ]
    }

    fn header(box_type: BoxType, offset: u64, size: u64) -> BoxHeader {
        BoxHeader {
            box_type,
            offset,
            size,
            header_size: 8,
        }
    }

    fn plan_offsets(plan: &mut RewritePlan) -> Vec<ChunkOffsetTable> {
        let mut tables = Vec::new();
        visit_chunk_offsets_mut(std::slice::from_mut(&mut plan.moov), &mut |t| {
            tables.push(t.clone())
        });
        tables
    }

    #[test]
    fn shifts_offsets_by_moov_size() {
        let headers = [
            header(BoxType::FTYP, 0, 24),
            header(BoxType::MDAT, 24, 1008),
            header(BoxType::MOOV, 1032, 500),
        ];
        let table = ChunkOffsetTable {
            wide: false,
            version_flags: [0; 4],
            offsets: vec![32, 500, 1000],
        };

        let mut plan = plan_rewrite(&headers, moov_with_table(table)).unwrap();
        assert!(!plan.promoted);
        assert_eq!(
            plan.segments,
            vec![
                Segment::Copy(headers[0]),
                Segment::Moov,
                Segment::Copy(headers[1]),
            ]
        );

        let moov_size = plan.moov.size();
        let tables = plan_offsets(&mut plan);
        assert_eq!(
            tables[0].offsets,
            vec![32 + moov_size, 500 + moov_size, 1000 + moov_size]
        );
    }

    #[test]
    fn overflowing_stco_is_promoted_to_co64() {
        let mdat_size = 0xFFFF_FFD0u64;
        let last_chunk = 0xFFFF_FF80u64;
        let headers = [
            header(BoxType::FTYP, 0, 24),
            header(BoxType::MDAT, 24, mdat_size),
            header(BoxType::MOOV, 24 + mdat_size, 400),
        ];
        let table = ChunkOffsetTable {
            wide: false,
            version_flags: [0; 4],
            offsets: vec![32, last_chunk],
        };

        let mut plan = plan_rewrite(&headers, moov_with_table(table)).unwrap();
        assert!(plan.promoted);

        let moov_size = plan.moov.size();
        let tables = plan_offsets(&mut plan);
        assert!(tables[0].wide);
        assert_eq!(tables[0].box_type(), BoxType::CO64);
        assert_eq!(tables[0].offsets, vec![32 + moov_size, last_chunk + moov_size]);
        assert!(tables[0].offsets[1] > u32::MAX as u64);
        assert_eq!(plan.output_size(), 24 + moov_size + mdat_size);
    }

    #[test]
    fn offset_outside_boxes_is_corrupt() {
        let headers = [
            header(BoxType::FTYP, 0, 24),
            header(BoxType::MDAT, 24, 100),
            header(BoxType::MOOV, 124, 300),
        ];
        let table = ChunkOffsetTable {
            wide: false,
            version_flags: [0; 4],
            offsets: vec![10_000],
        };

        let err = plan_rewrite(&headers, moov_with_table(table)).unwrap_err();
        assert!(matches!(err, Mp4Error::CorruptBox { .. }));
    }
}
