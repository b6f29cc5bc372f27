use image::{DynamicImage, ImageEncoder, codecs::jpeg::JpegEncoder};
use tracing::debug;

use crate::copyright::EXIF_HEADER;
use crate::pipeline::error::PipelineError;

/// Encode as baseline JPEG, embedding the ICC profile and EXIF block when given.
pub fn encode(
    image: &DynamicImage,
    quality: u8,
    icc_profile: Option<&[u8]>,
    exif: Option<&[u8]>,
) -> Result<Vec<u8>, PipelineError> {
    // JPEG doesn't support alpha channel, so convert to RGB
    let rgb_image = image.to_rgb8();
    let mut buffer = Vec::new();

    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    if let Some(profile_data) = icc_profile {
        match encoder.set_icc_profile(profile_data.to_vec()) {
            Ok(()) => debug!("JPEG ICC profile: {} bytes", profile_data.len()),
            Err(e) => debug!(
                "Failed to set ICC profile on JPEG encoder ({}), using standard JPEG",
                e
            ),
        }
    }
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    match exif {
        Some(exif) => insert_exif_segment(buffer, exif),
        None => Ok(buffer),
    }
}

/// Splice an APP1 `Exif` segment in right after SOI (and JFIF APP0, if present).
pub fn insert_exif_segment(mut jpeg: Vec<u8>, tiff: &[u8]) -> Result<Vec<u8>, PipelineError> {
    if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return Err(PipelineError::EncodingError(
            "not a JPEG stream".to_string(),
        ));
    }

    let segment_length = 2 + EXIF_HEADER.len() + tiff.len();
    let segment_length = u16::try_from(segment_length).map_err(|_| {
        PipelineError::EncodingError(format!("EXIF block too large: {} bytes", tiff.len()))
    })?;

    let mut insert_pos = 2;
    if jpeg[2] == 0xFF && jpeg[3] == 0xE0 && jpeg.len() >= 6 {
        let app0_length = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        if 4 + app0_length <= jpeg.len() {
            insert_pos = 4 + app0_length;
        }
    }

    let mut segment = Vec::with_capacity(segment_length as usize + 2);
    segment.extend_from_slice(&[0xFF, 0xE1]);
    segment.extend_from_slice(&segment_length.to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(tiff);
    jpeg.splice(insert_pos..insert_pos, segment);

    Ok(jpeg)
}

/// Locate the TIFF payload of the first APP1 `Exif` segment
pub fn find_exif_segment(jpeg: &[u8]) -> Option<&[u8]> {
    if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if marker == 0xDA || marker == 0xD9 {
            break;
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + length;
        if length < 2 || end > jpeg.len() {
            break;
        }
        let payload = &jpeg[pos + 4..end];
        if marker == 0xE1 && payload.starts_with(EXIF_HEADER) {
            return Some(&payload[EXIF_HEADER.len()..]);
        }
        pos = end;
    }

    None
}
