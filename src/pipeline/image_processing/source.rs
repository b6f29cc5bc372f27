use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frame, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

use super::icc;
use crate::pipeline::error::PipelineError;
use crate::pipeline::types::Size;

/// A decoded original, rotated upright, with the bits of the encoded file
/// later stages still need.
pub struct SourceImage {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
    pub icc_profile: Option<Vec<u8>>,
    pub orientation: u16,
    data: Vec<u8>,
}

impl SourceImage {
    pub fn decode(data: Vec<u8>) -> Result<Self, PipelineError> {
        let reader = ImageReader::new(Cursor::new(&data)).with_guessed_format()?;
        let format = reader.format();
        let image = reader.decode()?;

        let orientation = match format {
            Some(ImageFormat::Jpeg) | Some(ImageFormat::Tiff) => read_orientation(&data),
            _ => None,
        }
        .unwrap_or(1);
        let image = apply_orientation(image, orientation);
        let icc_profile = icc::extract_icc_profile(&data, format);

        debug!(
            "Decoded {:?} source {}x{} (orientation {}, icc {})",
            format,
            image.width(),
            image.height(),
            orientation,
            icc_profile.as_ref().map_or(0, Vec::len)
        );

        Ok(Self {
            image,
            format,
            icc_profile,
            orientation,
            data,
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Every frame of a GIF source, composited to full canvas size.
    pub fn animation_frames(&self) -> Result<Vec<Frame>, PipelineError> {
        let decoder = GifDecoder::new(Cursor::new(&self.data))?;
        Ok(decoder.into_frames().collect_frames()?)
    }
}

fn read_orientation(data: &[u8]) -> Option<u16> {
    let (exif, _warnings) = rexif::parse_buffer_quiet(data);
    let exif = exif.ok()?;
    exif.entries
        .iter()
        .find(|entry| matches!(entry.tag, rexif::ExifTag::Orientation))
        .and_then(|entry| match &entry.value {
            rexif::TagValue::U16(values) => values.first().copied(),
            _ => None,
        })
}

/// Rotate/flip so pixel (0, 0) is the visual top-left corner.
pub fn apply_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}
