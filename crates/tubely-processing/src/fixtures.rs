//! Synthetic MP4 files for tests.
//!
//! Files carry one track whose chunks are [`CHUNK_SIZE`] bytes of a
//! per-chunk pattern, so a rewritten file can be checked chunk by chunk.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::mp4::{parse_boxes, read_payload, scan_boxes, visit_chunk_offsets_mut, BoxType};

pub const CHUNK_SIZE: usize = 64;

const IDENTITY: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];
const ROTATE_90: [u32; 9] = [0, 0x0001_0000, 0, 0xFFFF_0000, 0, 0, 0, 0, 0x4000_0000];

#[derive(Debug, Clone)]
pub struct Mp4Fixture {
    width: u32,
    height: u32,
    chunks: usize,
    tkhd_version: u8,
    rotated: bool,
    zero_track_header: bool,
    audio_only: bool,
    moov_first: bool,
    free_before_mdat: bool,
    wide_offsets: bool,
    compressed_moov: bool,
    fragmented: bool,
}

impl Mp4Fixture {
    /// Moov-last file with a video track of the given presentation size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            chunks: 3,
            tkhd_version: 0,
            rotated: false,
            zero_track_header: false,
            audio_only: false,
            moov_first: false,
            free_before_mdat: false,
            wide_offsets: false,
            compressed_moov: false,
            fragmented: false,
        }
    }

    pub fn chunks(mut self, chunks: usize) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn tkhd_version(mut self, version: u8) -> Self {
        self.tkhd_version = version;
        self
    }

    pub fn rotated(mut self) -> Self {
        self.rotated = true;
        self
    }

    pub fn zero_track_header(mut self) -> Self {
        self.zero_track_header = true;
        self
    }

    pub fn audio_only(mut self) -> Self {
        self.audio_only = true;
        self
    }

    pub fn moov_first(mut self) -> Self {
        self.moov_first = true;
        self
    }

    pub fn free_before_mdat(mut self) -> Self {
        self.free_before_mdat = true;
        self
    }

    pub fn wide_offsets(mut self) -> Self {
        self.wide_offsets = true;
        self
    }

    pub fn compressed_moov(mut self) -> Self {
        self.compressed_moov = true;
        self
    }

    pub fn fragmented(mut self) -> Self {
        self.fragmented = true;
        self
    }

    fn ftyp() -> Vec<u8> {
        raw_box(b"ftyp", &[b"isom".as_slice(), &0x200u32.to_be_bytes(), b"isom", b"mp41"].concat())
    }

    fn free() -> Vec<u8> {
        raw_box(b"free", &[0u8; 8])
    }

    fn mdat(&self) -> Vec<u8> {
        let payload: Vec<u8> = (0..self.chunks).flat_map(chunk_payload).collect();
        raw_box(b"mdat", &payload)
    }

    fn moov_with_offsets(&self, first_chunk: u64) -> Vec<u8> {
        let offsets: Vec<u64> = (0..self.chunks)
            .map(|i| first_chunk + (i * CHUNK_SIZE) as u64)
            .collect();

        let (tkhd_w, tkhd_h) = if self.zero_track_header {
            (0, 0)
        } else {
            (self.width, self.height)
        };
        let handler: &[u8; 4] = if self.audio_only { b"soun" } else { b"vide" };
        let sample_entry = if self.audio_only {
            raw_box(b"mp4a", &[0u8; 28])
        } else {
            visual_sample_entry(self.width, self.height)
        };

        let mut stsd = vec![0, 0, 0, 0];
        stsd.extend_from_slice(&1u32.to_be_bytes());
        stsd.extend_from_slice(&sample_entry);

        let mut stsc = vec![0, 0, 0, 0];
        stsc.extend_from_slice(&1u32.to_be_bytes());
        for v in [1u32, 1, 1] {
            stsc.extend_from_slice(&v.to_be_bytes());
        }

        let mut stsz = vec![0, 0, 0, 0];
        stsz.extend_from_slice(&(CHUNK_SIZE as u32).to_be_bytes());
        stsz.extend_from_slice(&(self.chunks as u32).to_be_bytes());

        let stbl = raw_box(
            b"stbl",
            &[
                raw_box(b"stsd", &stsd),
                raw_box(b"stts", &[0u8; 8]),
                raw_box(b"stsc", &stsc),
                raw_box(b"stsz", &stsz),
                chunk_offset_box(&offsets, self.wide_offsets),
            ]
            .concat(),
        );
        let minf = raw_box(b"minf", &[raw_box(b"vmhd", &[0u8; 12]), stbl].concat());

        let mut hdlr = vec![0u8; 8];
        hdlr.extend_from_slice(handler);
        hdlr.extend_from_slice(&[0u8; 12]);
        hdlr.extend_from_slice(b"Handler\0");

        let mdia = raw_box(
            b"mdia",
            &[raw_box(b"mdhd", &[0u8; 24]), raw_box(b"hdlr", &hdlr), minf].concat(),
        );
        let trak = raw_box(
            b"trak",
            &[
                raw_box(b"tkhd", &tkhd_payload(self.tkhd_version, tkhd_w, tkhd_h, self.rotated)),
                mdia,
            ]
            .concat(),
        );

        let mut children = vec![raw_box(b"mvhd", &[0u8; 100]), trak];
        if self.compressed_moov {
            children.push(raw_box(b"cmov", &[0u8; 16]));
        }
        raw_box(b"moov", &children.concat())
    }

    /// The moov box exactly as it appears in [`Mp4Fixture::build`].
    pub fn moov_bytes(&self) -> Vec<u8> {
        let probe = self.moov_with_offsets(0);
        let mut before_mdat = Self::ftyp().len();
        if self.moov_first {
            before_mdat += probe.len();
        }
        if self.free_before_mdat {
            before_mdat += Self::free().len();
        }
        self.moov_with_offsets(before_mdat as u64 + 8)
    }

    pub fn build(&self) -> Vec<u8> {
        let moov = self.moov_bytes();
        let mut out = Self::ftyp();
        if self.moov_first {
            out.extend_from_slice(&moov);
        }
        if self.free_before_mdat {
            out.extend_from_slice(&Self::free());
        }
        out.extend_from_slice(&self.mdat());
        if self.fragmented {
            out.extend_from_slice(&raw_box(b"moof", &[0u8; 16]));
        }
        if !self.moov_first {
            out.extend_from_slice(&moov);
        }
        out
    }

    /// Write the file into `dir` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write fixture");
        path
    }
}

pub fn raw_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// Bytes of chunk `index`.
pub fn chunk_payload(index: usize) -> Vec<u8> {
    (0..CHUNK_SIZE)
        .map(|j| (index as u8).wrapping_mul(31).wrapping_add(j as u8))
        .collect()
}

fn chunk_offset_box(offsets: &[u64], wide: bool) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 0];
    payload.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for &o in offsets {
        if wide {
            payload.extend_from_slice(&o.to_be_bytes());
        } else {
            payload.extend_from_slice(&(o as u32).to_be_bytes());
        }
    }
    raw_box(if wide { b"co64" } else { b"stco" }, &payload)
}

fn visual_sample_entry(width: u32, height: u32) -> Vec<u8> {
    let mut body = vec![0u8; 78];
    body[7] = 1; // data_reference_index
    body[24..26].copy_from_slice(&(width as u16).to_be_bytes());
    body[26..28].copy_from_slice(&(height as u16).to_be_bytes());
    raw_box(b"avc1", &body)
}

/// Track header payload with the given presentation size.
pub fn tkhd_payload(version: u8, width: u32, height: u32, rotated: bool) -> Vec<u8> {
    let (len, matrix_at, size_at) = if version == 0 { (84, 40, 76) } else { (96, 52, 88) };
    let mut payload = vec![0u8; len];
    payload[0] = version;
    payload[3] = 3; // enabled | in_movie
    let matrix = if rotated { ROTATE_90 } else { IDENTITY };
    for (i, v) in matrix.iter().enumerate() {
        payload[matrix_at + i * 4..matrix_at + i * 4 + 4].copy_from_slice(&v.to_be_bytes());
    }
    payload[size_at..size_at + 4].copy_from_slice(&(width << 16).to_be_bytes());
    payload[size_at + 4..size_at + 8].copy_from_slice(&(height << 16).to_be_bytes());
    payload
}

/// Top-level box types in file order.
pub fn top_level_types(file: &[u8]) -> Vec<BoxType> {
    scan_boxes(&mut Cursor::new(file), 0, file.len() as u64)
        .expect("scan fixture")
        .into_iter()
        .map(|h| h.box_type)
        .collect()
}

/// Chunk offsets recorded in the file's moov.
pub fn chunk_offsets(file: &[u8]) -> Vec<u64> {
    let mut cursor = Cursor::new(file);
    let headers = scan_boxes(&mut cursor, 0, file.len() as u64).expect("scan fixture");
    let moov = headers
        .iter()
        .find(|h| h.box_type == BoxType::MOOV)
        .expect("moov present");
    let payload = read_payload(&mut cursor, moov).expect("read moov");
    let mut children = parse_boxes(&payload).expect("parse moov");

    let mut offsets = Vec::new();
    visit_chunk_offsets_mut(&mut children, &mut |table| {
        offsets.extend(table.offsets.iter().copied())
    });
    offsets
}

/// Bytes each chunk offset points at.
pub fn read_chunks(file: &[u8]) -> Vec<Vec<u8>> {
    chunk_offsets(file)
        .into_iter()
        .map(|o| file[o as usize..o as usize + CHUNK_SIZE].to_vec())
        .collect()
}
