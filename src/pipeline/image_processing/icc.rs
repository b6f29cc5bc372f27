use flate2::read::ZlibDecoder;
use image::ImageFormat;
use std::io::Read;
use tracing::debug;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const ICC_MARKER: &[u8; 12] = b"ICC_PROFILE\0";

/// Extract an embedded ICC profile from an encoded source image
pub fn extract_icc_profile(data: &[u8], format: Option<ImageFormat>) -> Option<Vec<u8>> {
    match format {
        Some(ImageFormat::Jpeg) => from_jpeg(data),
        Some(ImageFormat::Png) => from_png(data),
        _ => None,
    }
}

/// ICC profiles in JPEG live in APP2 segments tagged `ICC_PROFILE`, possibly
/// split over several segments carrying a sequence number and a total count.
pub fn from_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut chunks: Vec<(u8, &[u8])> = Vec::new();
    let mut pos = 2;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];

        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Start of scan or end of image: no more metadata segments
        if marker == 0xDA || marker == 0xD9 {
            break;
        }

        let segment_length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let segment_end = pos + 2 + segment_length;
        if segment_length < 2 || segment_end > data.len() {
            break;
        }

        if marker == 0xE2 {
            let segment_data = &data[pos + 4..segment_end];
            if segment_data.len() > 14 && segment_data.starts_with(ICC_MARKER) {
                let sequence = segment_data[12];
                chunks.push((sequence, &segment_data[14..]));
            }
        }

        pos = segment_end;
    }

    if chunks.is_empty() {
        return None;
    }

    chunks.sort_by_key(|(sequence, _)| *sequence);
    let profile: Vec<u8> = chunks
        .iter()
        .flat_map(|(_, chunk)| chunk.iter().copied())
        .collect();

    debug!(
        "Found ICC profile in JPEG: {} bytes in {} segment(s)",
        profile.len(),
        chunks.len()
    );
    Some(profile)
}

/// PNG carries the profile zlib-compressed in an `iCCP` chunk.
pub fn from_png(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 8 || &data[0..8] != PNG_SIGNATURE {
        return None;
    }

    let mut pos = 8;

    while pos + 12 <= data.len() {
        let chunk_length =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let chunk_type = &data[pos + 4..pos + 8];
        let chunk_data_start = pos + 8;
        let chunk_data_end = chunk_data_start.checked_add(chunk_length)?;

        if chunk_type == b"iCCP" && chunk_data_end <= data.len() {
            let chunk_data = &data[chunk_data_start..chunk_data_end];

            // Profile name (null-terminated), compression method, compressed profile
            if let Some(null_pos) = chunk_data.iter().position(|&b| b == 0)
                && null_pos + 2 < chunk_data.len()
                && chunk_data[null_pos + 1] == 0
            {
                let mut decoder = ZlibDecoder::new(&chunk_data[null_pos + 2..]);
                let mut decompressed = Vec::new();

                if decoder.read_to_end(&mut decompressed).is_ok() {
                    debug!(
                        "Found ICC profile in PNG: {} bytes (decompressed)",
                        decompressed.len()
                    );
                    return Some(decompressed);
                }
            }
        }

        // Image data follows the metadata chunks
        if chunk_type == b"IDAT" || chunk_type == b"IEND" {
            break;
        }

        pos = chunk_data_end + 4;
    }

    None
}
