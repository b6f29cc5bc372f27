use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame};
use tracing::debug;

use crate::pipeline::error::PipelineError;

/// Map the 1-100 quality scale onto the quantizer speed (1 best, 30 fastest)
pub fn speed_for_quality(quality: u8) -> i32 {
    let quality = quality.min(100) as i32;
    (30 - quality * 25 / 100).clamp(1, 30)
}

/// Single-frame GIF
pub fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    encode_frames(vec![Frame::new(image.to_rgba8())], quality)
}

/// Multi-frame GIF that loops forever; frame delays are kept as given.
pub fn encode_frames(frames: Vec<Frame>, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let frame_count = frames.len();
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buffer, speed_for_quality(quality));
        if frame_count > 1 {
            encoder.set_repeat(Repeat::Infinite)?;
        }
        encoder.encode_frames(frames)?;
        // Dropping the encoder writes the trailer
    }

    debug!(
        "GIF encoded {} frame(s) at quality {}: {} bytes",
        frame_count,
        quality,
        buffer.len()
    );
    Ok(buffer)
}
