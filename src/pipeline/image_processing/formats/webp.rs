use image::DynamicImage;
use tracing::{debug, warn};

use crate::pipeline::error::PipelineError;
use crate::webp_encoder::{PixelLayout, WebPEncoder, WebPMetadata};

/// Lossy WebP through libwebp, keeping alpha and muxing in ICC/EXIF metadata.
/// Falls back to the plain `webp` crate encoder (no metadata) if libwebp fails.
pub fn encode(
    image: &DynamicImage,
    quality: u8,
    icc_profile: Option<&[u8]>,
    exif: Option<&[u8]>,
) -> Result<Vec<u8>, PipelineError> {
    let (width, height) = (image.width(), image.height());
    let has_alpha = image.color().has_alpha();

    let (layout, pixels) = if has_alpha {
        (PixelLayout::Rgba, image.to_rgba8().into_raw())
    } else {
        (PixelLayout::Rgb, image.to_rgb8().into_raw())
    };

    let metadata = WebPMetadata { icc_profile, exif };
    let encoded = WebPEncoder::new(width, height, layout, pixels)
        .and_then(|encoder| encoder.encode(quality as f32, &metadata));

    match encoded {
        Ok(data) => {
            debug!(
                "WebP encoded {}x{} at quality {}: {} bytes",
                width,
                height,
                quality,
                data.len()
            );
            Ok(data)
        }
        Err(e) => {
            warn!("libwebp encoding failed ({}), using fallback encoder", e);
            Ok(encode_fallback(image, quality, has_alpha))
        }
    }
}

fn encode_fallback(image: &DynamicImage, quality: u8, has_alpha: bool) -> Vec<u8> {
    let (width, height) = (image.width(), image.height());
    if has_alpha {
        let rgba = image.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode(quality as f32)
            .to_vec()
    } else {
        let rgb = image.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode(quality as f32)
            .to_vec()
    }
}
