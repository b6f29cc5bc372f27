use image::DynamicImage;
use image::codecs::avif::AvifEncoder;
use tracing::debug;

use crate::pipeline::error::PipelineError;

/// rav1e speed; 1 is slowest/best, 10 fastest
const ENCODER_SPEED: u8 = 6;

pub fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    // The encoder only accepts 8-bit RGB(A)
    let image = if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };

    let mut buffer = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, ENCODER_SPEED, quality);
    image.write_with_encoder(encoder)?;

    debug!(
        "AVIF encoded {}x{} at quality {}: {} bytes",
        image.width(),
        image.height(),
        quality,
        buffer.len()
    );
    Ok(buffer)
}
