use std::io::{self, Cursor, Write};

use super::boxes::{scan_boxes, BoxType};
use super::Mp4Error;

/// Parsed box. Only the containers on the path to the chunk offset tables
/// are descended into; everything else is kept as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Mp4Box {
    Container {
        box_type: BoxType,
        children: Vec<Mp4Box>,
    },
    ChunkOffsets(ChunkOffsetTable),
    Leaf {
        box_type: BoxType,
        payload: Vec<u8>,
    },
}

/// `stco` (32-bit) or `co64` (64-bit) chunk offset table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOffsetTable {
    pub wide: bool,
    pub version_flags: [u8; 4],
    pub offsets: Vec<u64>,
}

impl ChunkOffsetTable {
    fn parse(box_type: BoxType, offset: u64, payload: &[u8]) -> Result<Self, Mp4Error> {
        let wide = box_type == BoxType::CO64;
        let entry_size = if wide { 8 } else { 4 };

        if payload.len() < 8 {
            return Err(Mp4Error::corrupt(box_type, offset, "truncated table header"));
        }
        let version_flags = [payload[0], payload[1], payload[2], payload[3]];
        let count = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;

        let needed = count
            .checked_mul(entry_size)
            .and_then(|n| n.checked_add(8))
            .ok_or_else(|| Mp4Error::corrupt(box_type, offset, "entry count overflows"))?;
        if payload.len() < needed {
            return Err(Mp4Error::corrupt(
                box_type,
                offset,
                format!("{} entries need {} bytes, have {}", count, needed, payload.len()),
            ));
        }

        let offsets = payload[8..needed]
            .chunks_exact(entry_size)
            .map(|entry| {
                if wide {
                    u64::from_be_bytes([
                        entry[0], entry[1], entry[2], entry[3], entry[4], entry[5], entry[6],
                        entry[7],
                    ])
                } else {
                    u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as u64
                }
            })
            .collect();

        Ok(Self {
            wide,
            version_flags,
            offsets,
        })
    }

    pub fn box_type(&self) -> BoxType {
        if self.wide {
            BoxType::CO64
        } else {
            BoxType::STCO
        }
    }

    fn payload_size(&self) -> u64 {
        let entry_size = if self.wide { 8 } else { 4 };
        8 + self.offsets.len() as u64 * entry_size
    }

    /// True when every offset fits the table's entry width.
    pub fn fits(&self) -> bool {
        self.wide || self.offsets.iter().all(|&o| o <= u32::MAX as u64)
    }

    fn write_payload<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version_flags)?;
        w.write_all(&(self.offsets.len() as u32).to_be_bytes())?;
        for &offset in &self.offsets {
            if self.wide {
                w.write_all(&offset.to_be_bytes())?;
            } else {
                let narrow = u32::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "chunk offset exceeds stco range")
                })?;
                w.write_all(&narrow.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

fn is_descended(box_type: BoxType) -> bool {
    matches!(
        box_type,
        BoxType::MOOV | BoxType::TRAK | BoxType::MDIA | BoxType::MINF | BoxType::STBL
    )
}

/// Parse a sequence of boxes from an in-memory payload.
pub fn parse_boxes(data: &[u8]) -> Result<Vec<Mp4Box>, Mp4Error> {
    let mut cursor = Cursor::new(data);
    let headers = scan_boxes(&mut cursor, 0, data.len() as u64)?;

    headers
        .into_iter()
        .map(|header| {
            let start = header.payload_offset() as usize;
            let payload = &data[start..header.end() as usize];
            let box_type = header.box_type;

            if is_descended(box_type) {
                Ok(Mp4Box::Container {
                    box_type,
                    children: parse_boxes(payload)?,
                })
            } else if box_type == BoxType::STCO || box_type == BoxType::CO64 {
                Ok(Mp4Box::ChunkOffsets(ChunkOffsetTable::parse(
                    box_type,
                    header.offset,
                    payload,
                )?))
            } else {
                Ok(Mp4Box::Leaf {
                    box_type,
                    payload: payload.to_vec(),
                })
            }
        })
        .collect()
}

impl Mp4Box {
    pub fn box_type(&self) -> BoxType {
        match self {
            Mp4Box::Container { box_type, .. } | Mp4Box::Leaf { box_type, .. } => *box_type,
            Mp4Box::ChunkOffsets(table) => table.box_type(),
        }
    }

    fn payload_size(&self) -> u64 {
        match self {
            Mp4Box::Container { children, .. } => children.iter().map(Mp4Box::size).sum(),
            Mp4Box::ChunkOffsets(table) => table.payload_size(),
            Mp4Box::Leaf { payload, .. } => payload.len() as u64,
        }
    }

    /// Encoded size including the header; 64-bit sizes are used only when needed.
    pub fn size(&self) -> u64 {
        let payload = self.payload_size();
        if payload + 8 > u32::MAX as u64 {
            payload + 16
        } else {
            payload + 8
        }
    }

    pub fn children(&self) -> &[Mp4Box] {
        match self {
            Mp4Box::Container { children, .. } => children,
            _ => &[],
        }
    }

    /// First direct child of the given type.
    pub fn child(&self, box_type: BoxType) -> Option<&Mp4Box> {
        self.children().iter().find(|b| b.box_type() == box_type)
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Mp4Box::Leaf { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let size = self.size();
        if size > u32::MAX as u64 {
            w.write_all(&1u32.to_be_bytes())?;
            w.write_all(&self.box_type().0)?;
            w.write_all(&size.to_be_bytes())?;
        } else {
            w.write_all(&(size as u32).to_be_bytes())?;
            w.write_all(&self.box_type().0)?;
        }

        match self {
            Mp4Box::Container { children, .. } => {
                for child in children {
                    child.write_to(w)?;
                }
                Ok(())
            }
            Mp4Box::ChunkOffsets(table) => table.write_payload(w),
            Mp4Box::Leaf { payload, .. } => w.write_all(payload),
        }
    }
}

/// Apply `f` to every chunk offset table under `boxes`.
pub fn visit_chunk_offsets_mut<F: FnMut(&mut ChunkOffsetTable)>(boxes: &mut [Mp4Box], f: &mut F) {
    for b in boxes {
        match b {
            Mp4Box::Container { children, .. } => visit_chunk_offsets_mut(children, f),
            Mp4Box::ChunkOffsets(table) => f(table),
            Mp4Box::Leaf { .. } => {}
        }
    }
}

pub fn encode_boxes(boxes: &[Mp4Box]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(boxes.iter().map(Mp4Box::size).sum::<u64>() as usize);
    for b in boxes {
        b.write_to(&mut out)?;
    }
    Ok(out)
}
