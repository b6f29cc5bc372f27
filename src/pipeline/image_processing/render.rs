use image::imageops::{self, FilterType};
use image::{DynamicImage, Frame, Rgba, RgbaImage};
use tracing::debug;

use super::formats;
use super::source::SourceImage;
use crate::pipeline::error::PipelineError;
use crate::pipeline::geometry::clamp_to_image;
use crate::pipeline::types::{Color, OutputFormat, Rectangle, Region, Size};

/// Everything needed to produce one encoded candidate from a source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPlan {
    pub format: OutputFormat,
    pub quality: u8,
    pub region: Region,
    pub output: Size,
    /// Flatten transparency onto this color before encoding
    pub background: Option<Color>,
    pub animated: bool,
}

/// Crop, flatten, resize and encode.
///
/// `exif` is a TIFF block stamped into JPEG and WebP outputs; AVIF and GIF
/// are written without it.
pub fn render(
    source: &SourceImage,
    plan: &RenderPlan,
    exif: Option<&[u8]>,
) -> Result<Vec<u8>, PipelineError> {
    if plan.format == OutputFormat::Gif && plan.animated {
        let frames = source
            .animation_frames()?
            .into_iter()
            .map(|frame| transform_frame(frame, plan))
            .collect::<Vec<_>>();
        debug!("Rendering {} animation frame(s) at {}", frames.len(), plan.output);
        return formats::gif::encode_frames(frames, plan.quality);
    }

    let image = transform(&source.image, plan);
    let icc_profile = source.icc_profile.as_deref();

    match plan.format {
        OutputFormat::Jpeg => formats::jpeg::encode(&image, plan.quality, icc_profile, exif),
        OutputFormat::WebP => formats::webp::encode(&image, plan.quality, icc_profile, exif),
        OutputFormat::Avif => formats::avif::encode(&image, plan.quality),
        OutputFormat::Gif => formats::gif::encode(&image, plan.quality),
    }
}

/// Apply the plan's geometry and background to a still image.
pub fn transform(image: &DynamicImage, plan: &RenderPlan) -> DynamicImage {
    let region = plan.region;
    let mut result = image.crop_imm(region.x, region.y, region.width, region.height);

    if let Some(background) = plan.background
        && result.color().has_alpha()
    {
        result = DynamicImage::ImageRgb8(
            DynamicImage::ImageRgba8(flatten(&result.to_rgba8(), background)).to_rgb8(),
        );
    }

    if result.width() != plan.output.width || result.height() != plan.output.height {
        result = result.resize_exact(plan.output.width, plan.output.height, FilterType::Lanczos3);
    }
    result
}

fn transform_frame(frame: Frame, plan: &RenderPlan) -> Frame {
    let delay = frame.delay();
    let buffer = frame.into_buffer();

    // Frames share the canvas size, but guard against odd files anyway
    let canvas = Size::new(buffer.width(), buffer.height());
    let region = clamp_to_image(
        &Rectangle::new(
            plan.region.x as f64,
            plan.region.y as f64,
            plan.region.width as f64,
            plan.region.height as f64,
        ),
        canvas,
    );

    let mut cropped =
        imageops::crop_imm(&buffer, region.x, region.y, region.width, region.height).to_image();
    if let Some(background) = plan.background {
        cropped = flatten(&cropped, background);
    }
    if cropped.dimensions() != (plan.output.width, plan.output.height) {
        cropped = imageops::resize(
            &cropped,
            plan.output.width,
            plan.output.height,
            FilterType::Lanczos3,
        );
    }

    Frame::from_parts(cropped, 0, 0, delay)
}

/// Alpha-blend every pixel over an opaque background color.
pub fn flatten(image: &RgbaImage, background: Color) -> RgbaImage {
    let mut flattened = image.clone();
    for pixel in flattened.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as u32;
        let blend =
            |channel: u8, under: u8| ((channel as u32 * alpha + under as u32 * (255 - alpha) + 127) / 255) as u8;
        *pixel = Rgba([
            blend(r, background.r),
            blend(g, background.g),
            blend(b, background.b),
            255,
        ]);
    }
    flattened
}
