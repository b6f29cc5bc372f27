//! Output format and quality selection, and the transform driver.

use image::ImageFormat;
use std::sync::Arc;
use tracing::debug;

use super::error::PipelineError;
use super::geometry::Geometry;
use super::image_processing::{self, RenderPlan, SourceImage};
use super::types::{Color, OutputFormat, Size, TransformSpec};
use crate::copyright::CopyrightConfig;

/// GIF output always uses the top of the quality scale
pub const GIF_QUALITY: u8 = 100;
pub const AVIF_QUALITY_SMALL: u8 = 70;
pub const AVIF_QUALITY_MEDIUM: u8 = 60;
pub const AVIF_QUALITY_LARGE: u8 = 50;

const AVIF_SMALL_PIXELS: u64 = 400 * 400;
const AVIF_MEDIUM_PIXELS: u64 = 800 * 800;

/// Animated GIFs at or below this size are flattened to their first frame
pub const ANIMATION_MIN_SIDE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Single { format: OutputFormat, animated: bool },
    /// Encode both and keep the smaller output
    Smallest(OutputFormat, OutputFormat),
}

/// Pick the output format(s) for a request.
///
/// An explicit format is used as-is. Otherwise JPEG stays JPEG, GIF stays
/// GIF, other lossless or alpha-carrying sources become WebP, and anything
/// left is decided by encoding both WebP and JPEG.
pub fn choose_format(
    params: &TransformSpec,
    source_format: Option<ImageFormat>,
    has_alpha: bool,
    output: Size,
) -> FormatChoice {
    if let Some(format) = params.format {
        return FormatChoice::Single {
            format,
            animated: false,
        };
    }

    match source_format {
        Some(ImageFormat::Jpeg) => FormatChoice::Single {
            format: OutputFormat::Jpeg,
            animated: false,
        },
        Some(ImageFormat::Gif) => FormatChoice::Single {
            format: OutputFormat::Gif,
            animated: requested_side(params, output) > ANIMATION_MIN_SIDE,
        },
        Some(ImageFormat::Png | ImageFormat::WebP | ImageFormat::Tiff) => FormatChoice::Single {
            format: OutputFormat::WebP,
            animated: false,
        },
        _ if has_alpha => FormatChoice::Single {
            format: OutputFormat::WebP,
            animated: false,
        },
        _ => FormatChoice::Smallest(OutputFormat::WebP, OutputFormat::Jpeg),
    }
}

/// Larger requested dimension. A side left open is filled in from the ratio,
/// so the planned output's larger side counts as well.
fn requested_side(params: &TransformSpec, output: Size) -> u32 {
    match (params.width, params.height) {
        (Some(width), Some(height)) => width.max(height),
        (Some(side), None) | (None, Some(side)) => side.max(output.larger_side()),
        (None, None) => output.larger_side(),
    }
}

/// Caller-forced quality wins; otherwise per-format defaults.
pub fn quality_for(
    format: OutputFormat,
    requested: Option<u8>,
    default_quality: u8,
    output: Size,
) -> u8 {
    if let Some(quality) = requested {
        return quality;
    }

    match format {
        OutputFormat::Jpeg | OutputFormat::WebP => default_quality,
        OutputFormat::Gif => GIF_QUALITY,
        OutputFormat::Avif => match output.pixel_count() {
            pixels if pixels < AVIF_SMALL_PIXELS => AVIF_QUALITY_SMALL,
            pixels if pixels < AVIF_MEDIUM_PIXELS => AVIF_QUALITY_MEDIUM,
            _ => AVIF_QUALITY_LARGE,
        },
    }
}

/// JPEG cannot carry alpha, so it always gets an opaque background.
pub fn background_for(format: OutputFormat, requested: Option<Color>) -> Option<Color> {
    match format {
        OutputFormat::Jpeg => Some(requested.unwrap_or(Color::WHITE)),
        _ => requested,
    }
}

#[derive(Debug, Clone)]
pub struct Optimized {
    pub buffer: Vec<u8>,
    pub format: OutputFormat,
    pub size: Size,
}

#[derive(Debug, Clone)]
pub struct FormatOptimizer {
    default_quality: u8,
    copyright: Option<CopyrightConfig>,
}

impl FormatOptimizer {
    pub fn new(default_quality: u8, copyright_holder: Option<String>) -> Self {
        Self {
            default_quality,
            copyright: copyright_holder
                .filter(|holder| !holder.trim().is_empty())
                .map(CopyrightConfig::new),
        }
    }

    pub fn default_quality(&self) -> u8 {
        self.default_quality
    }

    /// Decode `image`, apply `params` and encode in the chosen format.
    pub async fn optimize(
        &self,
        image: Vec<u8>,
        params: &TransformSpec,
    ) -> Result<Optimized, PipelineError> {
        let source = tokio::task::spawn_blocking(move || SourceImage::decode(image)).await??;
        let source = Arc::new(source);

        let geometry = Geometry::resolve(params, source.size());
        let choice = choose_format(params, source.format, source.has_alpha(), geometry.output);
        debug!(
            "Source {} ({:?}) -> region {:?}, output {}, {:?}",
            source.size(),
            source.format,
            geometry.region,
            geometry.output,
            choice
        );

        match choice {
            FormatChoice::Single { format, animated } => {
                let plan = self.plan(params, &geometry, format, animated);
                self.render(source, plan).await
            }
            FormatChoice::Smallest(first, second) => {
                let first = self.render(source.clone(), self.plan(params, &geometry, first, false));
                let second = self.render(source, self.plan(params, &geometry, second, false));
                let (first, second) = tokio::try_join!(first, second)?;
                debug!(
                    "Candidates: {} {} bytes, {} {} bytes",
                    first.format,
                    first.buffer.len(),
                    second.format,
                    second.buffer.len()
                );
                Ok(if second.buffer.len() < first.buffer.len() {
                    second
                } else {
                    first
                })
            }
        }
    }

    fn plan(
        &self,
        params: &TransformSpec,
        geometry: &Geometry,
        format: OutputFormat,
        animated: bool,
    ) -> RenderPlan {
        RenderPlan {
            format,
            quality: quality_for(format, params.quality, self.default_quality, geometry.output),
            region: geometry.region,
            output: geometry.output,
            background: background_for(format, params.background),
            animated,
        }
    }

    async fn render(
        &self,
        source: Arc<SourceImage>,
        plan: RenderPlan,
    ) -> Result<Optimized, PipelineError> {
        let exif = match (&self.copyright, plan.format) {
            (Some(copyright), OutputFormat::Jpeg | OutputFormat::WebP) => {
                Some(copyright.exif_block())
            }
            (Some(_), format) => {
                debug!("No copyright marker for {} output", format);
                None
            }
            (None, _) => None,
        };

        let buffer = tokio::task::spawn_blocking(move || {
            image_processing::render(&source, &plan, exif.as_deref())
        })
        .await??;

        Ok(Optimized {
            buffer,
            format: plan.format,
            size: plan.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn dims(width: Option<u32>, height: Option<u32>) -> TransformSpec {
        TransformSpec {
            width,
            height,
            ..TransformSpec::default()
        }
    }

    fn single(format: OutputFormat, animated: bool) -> FormatChoice {
        FormatChoice::Single { format, animated }
    }

    #[test]
    fn test_explicit_format_wins() {
        let params = TransformSpec {
            format: Some(OutputFormat::Avif),
            ..TransformSpec::default()
        };
        let size = Size::new(100, 100);
        assert_eq!(
            choose_format(&params, Some(ImageFormat::Jpeg), false, size),
            single(OutputFormat::Avif, false)
        );
        assert_eq!(
            choose_format(&params, Some(ImageFormat::Gif), true, size),
            single(OutputFormat::Avif, false)
        );
    }

    #[test]
    fn test_jpeg_stays_jpeg() {
        let size = Size::new(100, 100);
        for alpha in [false, true] {
            assert_eq!(
                choose_format(&TransformSpec::default(), Some(ImageFormat::Jpeg), alpha, size),
                single(OutputFormat::Jpeg, false)
            );
        }
    }

    #[test]
    fn test_png_with_alpha_becomes_webp() {
        let size = Size::new(100, 100);
        assert_eq!(
            choose_format(&TransformSpec::default(), Some(ImageFormat::Png), true, size),
            single(OutputFormat::WebP, false)
        );
        assert_eq!(
            choose_format(&TransformSpec::default(), Some(ImageFormat::Png), false, size),
            single(OutputFormat::WebP, false)
        );
        assert_eq!(
            choose_format(&TransformSpec::default(), Some(ImageFormat::Bmp), true, size),
            single(OutputFormat::WebP, false)
        );
    }

    #[test]
    fn test_unlabelled_source_compares_candidates() {
        assert_eq!(
            choose_format(
                &TransformSpec::default(),
                Some(ImageFormat::Bmp),
                false,
                Size::new(10, 10)
            ),
            FormatChoice::Smallest(OutputFormat::WebP, OutputFormat::Jpeg)
        );
        assert_eq!(
            choose_format(&TransformSpec::default(), None, false, Size::new(10, 10)),
            FormatChoice::Smallest(OutputFormat::WebP, OutputFormat::Jpeg)
        );
    }

    #[test]
    fn test_gif_animation_threshold() {
        let output = Size::new(50, 50);
        let gif = Some(ImageFormat::Gif);
        assert_eq!(
            choose_format(&dims(Some(50), Some(50)), gif, false, output),
            single(OutputFormat::Gif, false)
        );
        assert_eq!(
            choose_format(&dims(Some(250), Some(250)), gif, false, output),
            single(OutputFormat::Gif, true)
        );
        assert_eq!(
            choose_format(&dims(Some(200), Some(100)), gif, false, output),
            single(OutputFormat::Gif, false)
        );
        assert_eq!(
            choose_format(&dims(None, Some(201)), gif, false, output),
            single(OutputFormat::Gif, true)
        );
        // Portrait source asked for by width only: the derived height counts
        assert_eq!(
            choose_format(&dims(Some(150), None), gif, false, Size::new(150, 600)),
            single(OutputFormat::Gif, true)
        );
        assert_eq!(
            choose_format(&dims(Some(150), None), gif, false, Size::new(150, 100)),
            single(OutputFormat::Gif, false)
        );
        // Nothing requested: judged on the output size
        assert_eq!(
            choose_format(&dims(None, None), gif, false, Size::new(640, 480)),
            single(OutputFormat::Gif, true)
        );
        assert_eq!(
            choose_format(&dims(None, None), gif, false, Size::new(120, 80)),
            single(OutputFormat::Gif, false)
        );
    }

    #[test]
    fn test_avif_quality_tiers() {
        let avif = |w, h| quality_for(OutputFormat::Avif, None, 80, Size::new(w, h));
        assert_eq!(avif(399, 399), AVIF_QUALITY_SMALL);
        assert_eq!(avif(400, 400), AVIF_QUALITY_MEDIUM);
        assert_eq!(avif(799, 799), AVIF_QUALITY_MEDIUM);
        assert_eq!(avif(800, 800), AVIF_QUALITY_LARGE);
        assert!(AVIF_QUALITY_SMALL > AVIF_QUALITY_MEDIUM);
        assert!(AVIF_QUALITY_MEDIUM > AVIF_QUALITY_LARGE);
    }

    #[test]
    fn test_quality_defaults_and_override() {
        let size = Size::new(300, 300);
        assert_eq!(quality_for(OutputFormat::Jpeg, None, 82, size), 82);
        assert_eq!(quality_for(OutputFormat::WebP, None, 82, size), 82);
        assert_eq!(quality_for(OutputFormat::Gif, None, 82, size), GIF_QUALITY);
        for format in [
            OutputFormat::Jpeg,
            OutputFormat::WebP,
            OutputFormat::Avif,
            OutputFormat::Gif,
        ] {
            assert_eq!(quality_for(format, Some(33), 82, size), 33);
        }
    }

    #[test]
    fn test_background_forced_for_jpeg() {
        let red = Color::new(255, 0, 0);
        assert_eq!(background_for(OutputFormat::Jpeg, None), Some(Color::WHITE));
        assert_eq!(background_for(OutputFormat::Jpeg, Some(red)), Some(red));
        assert_eq!(background_for(OutputFormat::WebP, None), None);
        assert_eq!(background_for(OutputFormat::WebP, Some(red)), Some(red));
    }

    #[test]
    fn test_blank_copyright_holder_ignored() {
        let optimizer = FormatOptimizer::new(80, Some("  ".to_string()));
        assert!(optimizer.copyright.is_none());
        let optimizer = FormatOptimizer::new(80, Some("Jane".to_string()));
        assert!(optimizer.copyright.is_some());
    }

    #[tokio::test]
    async fn test_optimize_explicit_webp() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(800, 600, Rgb([90, 60, 30])));
        let params = TransformSpec {
            format: Some(OutputFormat::WebP),
            width: Some(300),
            height: Some(400),
            ..TransformSpec::default()
        };

        let optimizer = FormatOptimizer::new(80, None);
        let result = optimizer
            .optimize(encode(&image, ImageFormat::Jpeg), &params)
            .await
            .unwrap();

        assert_eq!(result.format, OutputFormat::WebP);
        assert_eq!(result.size, Size::new(300, 400));
        let decoded = image::load_from_memory(&result.buffer).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 400));
    }

    #[tokio::test]
    async fn test_optimize_jpeg_source_stays_jpeg_with_copyright() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(120, 90, Rgb([1, 2, 3])));
        let optimizer = FormatOptimizer::new(80, Some("Jane".to_string()));

        let result = optimizer
            .optimize(encode(&image, ImageFormat::Jpeg), &dims(Some(60), None))
            .await
            .unwrap();

        assert_eq!(result.format, OutputFormat::Jpeg);
        assert_eq!(result.size, Size::new(60, 45));
        let exif = crate::pipeline::image_processing::formats::jpeg::find_exif_segment(&result.buffer)
            .expect("copyright EXIF present");
        assert!(
            crate::copyright::read_copyright(exif)
                .unwrap()
                .ends_with("Jane")
        );
    }

    #[tokio::test]
    async fn test_optimize_png_alpha_becomes_webp() {
        let image =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(64, 64, Rgba([255, 0, 0, 100])));
        let optimizer = FormatOptimizer::new(80, None);

        let result = optimizer
            .optimize(encode(&image, ImageFormat::Png), &TransformSpec::default())
            .await
            .unwrap();
        assert_eq!(result.format, OutputFormat::WebP);
        assert_eq!(result.size, Size::new(64, 64));
    }

    #[tokio::test]
    async fn test_optimize_smallest_candidate() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        }));
        let optimizer = FormatOptimizer::new(80, None);

        let result = optimizer
            .optimize(encode(&image, ImageFormat::Bmp), &TransformSpec::default())
            .await
            .unwrap();
        assert!(matches!(
            result.format,
            OutputFormat::WebP | OutputFormat::Jpeg
        ));

        // The winner is never larger than a lone encode of the other format
        let other = if result.format == OutputFormat::WebP {
            OutputFormat::Jpeg
        } else {
            OutputFormat::WebP
        };
        let params = TransformSpec {
            format: Some(other),
            ..TransformSpec::default()
        };
        let loser = optimizer
            .optimize(encode(&image, ImageFormat::Bmp), &params)
            .await
            .unwrap();
        assert!(result.buffer.len() <= loser.buffer.len());
    }

    #[tokio::test]
    async fn test_optimize_rejects_undecodable_input() {
        let optimizer = FormatOptimizer::new(80, None);
        let result = optimizer
            .optimize(b"not an image".to_vec(), &TransformSpec::default())
            .await;
        assert!(matches!(result, Err(PipelineError::ImageError(_))));
    }
}
