use super::boxes::BoxType;
use super::tree::Mp4Box;

const HANDLER_VIDEO: &[u8; 4] = b"vide";

/// Display dimensions of the first video track in a parsed `moov`.
///
/// Uses the track header presentation size, swapped when the track matrix
/// rotates by 90 or 270 degrees, and falls back to the coded size in the
/// first visual sample entry when the header carries zeros.
pub fn video_dimensions(moov: &Mp4Box) -> Option<(u32, u32)> {
    moov.children()
        .iter()
        .filter(|b| b.box_type() == BoxType::TRAK)
        .filter(|trak| is_video_track(trak))
        .find_map(|trak| {
            let header = trak
                .child(BoxType::TKHD)
                .and_then(Mp4Box::payload)
                .and_then(track_header_dimensions)
                .filter(|&(w, h)| w > 0 && h > 0);

            header.or_else(|| {
                trak.child(BoxType::MDIA)
                    .and_then(|m| m.child(BoxType::MINF))
                    .and_then(|m| m.child(BoxType::STBL))
                    .and_then(|s| s.child(BoxType::STSD))
                    .and_then(Mp4Box::payload)
                    .and_then(sample_entry_dimensions)
                    .filter(|&(w, h)| w > 0 && h > 0)
            })
        })
}

fn is_video_track(trak: &Mp4Box) -> bool {
    trak.child(BoxType::MDIA)
        .and_then(|mdia| mdia.child(BoxType::HDLR))
        .and_then(Mp4Box::payload)
        .map(|hdlr| hdlr.len() >= 12 && &hdlr[8..12] == HANDLER_VIDEO)
        .unwrap_or(false)
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// tkhd: matrix then 16.16 fixed-point width and height.
/// Version 0 has 32-bit times (matrix at 40, size at 76);
/// version 1 has 64-bit times (matrix at 52, size at 88).
fn track_header_dimensions(tkhd: &[u8]) -> Option<(u32, u32)> {
    let (matrix_at, size_at) = match *tkhd.first()? {
        0 => (40, 76),
        _ => (52, 88),
    };
    let width = be_u32(tkhd, size_at)? >> 16;
    let height = be_u32(tkhd, size_at + 4)? >> 16;

    let a = be_u32(tkhd, matrix_at)?;
    let b = be_u32(tkhd, matrix_at + 4)?;
    let d = be_u32(tkhd, matrix_at + 16)?;
    if a == 0 && d == 0 && b != 0 {
        Some((height, width))
    } else {
        Some((width, height))
    }
}

/// stsd: version/flags, entry count, then the first entry; a visual sample
/// entry has its 16-bit width and height 24 bytes into the entry body.
fn sample_entry_dimensions(stsd: &[u8]) -> Option<(u32, u32)> {
    const FIRST_ENTRY_BODY: usize = 8 + 8;
    let width = be_u16(stsd, FIRST_ENTRY_BODY + 24)?;
    let height = be_u16(stsd, FIRST_ENTRY_BODY + 26)?;
    Some((width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{tkhd_payload, Mp4Fixture};
    use crate::mp4::parse_boxes;

    fn moov_of(fixture: &Mp4Fixture) -> Mp4Box {
        let boxes = parse_boxes(&fixture.moov_bytes()).unwrap();
        boxes.into_iter().next().unwrap()
    }

    #[test]
    fn reads_track_header_size() {
        let moov = moov_of(&Mp4Fixture::new(1920, 1080));
        assert_eq!(video_dimensions(&moov), Some((1920, 1080)));
    }

    #[test]
    fn reads_version_1_track_header() {
        let moov = moov_of(&Mp4Fixture::new(1080, 1920).tkhd_version(1));
        assert_eq!(video_dimensions(&moov), Some((1080, 1920)));
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let moov = moov_of(&Mp4Fixture::new(1920, 1080).rotated());
        assert_eq!(video_dimensions(&moov), Some((1080, 1920)));
    }

    #[test]
    fn falls_back_to_sample_entry() {
        let moov = moov_of(&Mp4Fixture::new(1280, 720).zero_track_header());
        assert_eq!(video_dimensions(&moov), Some((1280, 720)));
    }

    #[test]
    fn ignores_non_video_tracks() {
        let moov = moov_of(&Mp4Fixture::new(640, 480).audio_only());
        assert_eq!(video_dimensions(&moov), None);
    }

    #[test]
    fn track_header_layout() {
        let v0 = tkhd_payload(0, 640, 360, false);
        assert_eq!(v0.len(), 84);
        assert_eq!(track_header_dimensions(&v0), Some((640, 360)));

        let v1 = tkhd_payload(1, 640, 360, true);
        assert_eq!(v1.len(), 96);
        assert_eq!(track_header_dimensions(&v1), Some((360, 640)));
    }
}
