//! ISO base media file format (MP4 / QuickTime) box handling.
//!
//! Only what the prober and the fast-start rewriter need: top-level box
//! scanning, a moov tree that descends into the sample table, and video
//! track dimensions.

mod boxes;
mod track;
mod tree;

pub use boxes::{read_payload, scan_boxes, BoxHeader, BoxType, MAX_BOX_PAYLOAD};
pub use track::video_dimensions;
pub use tree::{encode_boxes, parse_boxes, visit_chunk_offsets_mut, ChunkOffsetTable, Mp4Box};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Mp4Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt {box_type} box at offset {offset}: {reason}")]
    CorruptBox {
        box_type: String,
        offset: u64,
        reason: String,
    },

    #[error("missing required box: {0}")]
    MissingBox(&'static str),

    #[error("unsupported layout: {0}")]
    Unsupported(String),

    #[error("{box_type} box payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge {
        box_type: String,
        size: u64,
        max: u64,
    },
}

impl Mp4Error {
    pub(crate) fn corrupt(box_type: impl ToString, offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptBox {
            box_type: box_type.to_string(),
            offset,
            reason: reason.into(),
        }
    }
}
