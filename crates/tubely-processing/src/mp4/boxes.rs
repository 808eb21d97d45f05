use std::io::{Read, Seek, SeekFrom};

use super::Mp4Error;

/// Largest box payload read into memory (moov and its children).
pub const MAX_BOX_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOF: Self = Self(*b"moof");
    pub const CMOV: Self = Self(*b"cmov");
    pub const FREE: Self = Self(*b"free");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position and extent of a box within its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// Offset of the first header byte
    pub offset: u64,
    /// Total size including header
    pub size: u64,
    /// 8, or 16 with a 64-bit size field
    pub header_size: u8,
}

impl BoxHeader {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    pub fn payload_size(&self) -> u64 {
        self.size - self.header_size as u64
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.offset && position < self.end()
    }
}

/// Read every box header in `[start, end)`.
///
/// Sizes are validated strictly: a box that is smaller than its header or
/// runs past `end` is corrupt. A size of zero extends the box to `end`.
pub fn scan_boxes<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> Result<Vec<BoxHeader>, Mp4Error> {
    let mut headers = Vec::new();
    let mut pos = start;

    while pos < end {
        if end - pos < 8 {
            return Err(Mp4Error::corrupt(
                "????",
                pos,
                format!("{} trailing bytes cannot hold a box header", end - pos),
            ));
        }

        reader.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;

        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let box_type = BoxType([header[4], header[5], header[6], header[7]]);

        let (size, header_size) = match size32 {
            1 => {
                if end - pos < 16 {
                    return Err(Mp4Error::corrupt(box_type, pos, "truncated 64-bit size"));
                }
                let mut large = [0u8; 8];
                reader.read_exact(&mut large)?;
                (u64::from_be_bytes(large), 16u8)
            }
            0 => (end - pos, 8u8),
            size => (size, 8u8),
        };

        if size < header_size as u64 {
            return Err(Mp4Error::corrupt(
                box_type,
                pos,
                format!("size {} is smaller than its header", size),
            ));
        }
        if size > end - pos {
            return Err(Mp4Error::corrupt(
                box_type,
                pos,
                format!("size {} runs past the end of its parent at {}", size, end),
            ));
        }

        headers.push(BoxHeader {
            box_type,
            offset: pos,
            size,
            header_size,
        });
        pos += size;
    }

    Ok(headers)
}

/// Read a box payload into memory, rejecting payloads over [`MAX_BOX_PAYLOAD`].
pub fn read_payload<R: Read + Seek>(reader: &mut R, header: &BoxHeader) -> Result<Vec<u8>, Mp4Error> {
    let size = header.payload_size();
    if size > MAX_BOX_PAYLOAD {
        return Err(Mp4Error::TooLarge {
            box_type: header.box_type.to_string(),
            size,
            max: MAX_BOX_PAYLOAD,
        });
    }
    reader.seek(SeekFrom::Start(header.payload_offset()))?;
    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(box_type);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn scans_sequential_boxes() {
        let mut data = raw_box(b"ftyp", b"isom\0\0\0\x01");
        data.extend(raw_box(b"mdat", &[7u8; 20]));
        let len = data.len() as u64;

        let headers = scan_boxes(&mut Cursor::new(&data), 0, len).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].box_type, BoxType::FTYP);
        assert_eq!(headers[1].box_type, BoxType::MDAT);
        assert_eq!(headers[1].offset, 16);
        assert_eq!(headers[1].payload_size(), 20);
        assert!(headers[1].contains(16));
        assert!(!headers[1].contains(44));
    }

    #[test]
    fn reads_64_bit_size() {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&(16u64 + 4).to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);

        let headers = scan_boxes(&mut Cursor::new(&data), 0, data.len() as u64).unwrap();
        assert_eq!(headers[0].header_size, 16);
        assert_eq!(headers[0].size, 20);
        assert_eq!(headers[0].payload_offset(), 16);
    }

    #[test]
    fn zero_size_extends_to_end() {
        let mut data = raw_box(b"ftyp", b"isom");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0u8; 100]);

        let headers = scan_boxes(&mut Cursor::new(&data), 0, data.len() as u64).unwrap();
        assert_eq!(headers[1].size, 108);
    }

    #[test]
    fn rejects_box_running_past_parent() {
        let mut data = 100u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0u8; 10]);

        let err = scan_boxes(&mut Cursor::new(&data), 0, data.len() as u64).unwrap_err();
        assert!(matches!(err, Mp4Error::CorruptBox { .. }));
    }

    #[test]
    fn rejects_undersized_box_and_trailing_garbage() {
        let mut data = 4u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"free");
        assert!(scan_boxes(&mut Cursor::new(&data), 0, 8).is_err());

        let mut data = raw_box(b"free", &[]);
        data.extend_from_slice(&[1, 2, 3]);
        assert!(scan_boxes(&mut Cursor::new(&data), 0, data.len() as u64).is_err());
    }

    #[test]
    fn payload_read_respects_limit() {
        let header = BoxHeader {
            box_type: BoxType::MOOV,
            offset: 0,
            size: MAX_BOX_PAYLOAD + 9,
            header_size: 8,
        };
        let err = read_payload(&mut Cursor::new(Vec::<u8>::new()), &header).unwrap_err();
        assert!(matches!(err, Mp4Error::TooLarge { .. }));
    }
}
