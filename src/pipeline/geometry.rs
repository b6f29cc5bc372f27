//! Focus-biased crop resolution and output sizing.

use super::types::{Point, Rectangle, Region, Size, TransformSpec};

/// Resolved extraction region and output size for one source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub ratio: f64,
    pub region: Region,
    pub output: Size,
}

impl Geometry {
    pub fn resolve(params: &TransformSpec, image: Size) -> Self {
        let bound = params.crop.unwrap_or_else(|| Rectangle::covering(image));
        let focus = params.focus.unwrap_or_else(|| default_focus(image));
        let ratio = resolve_ratio(params.width, params.height, &bound);
        let region = clamp_to_image(&resolve(ratio, focus, &bound), image);
        let output = limited_size(params.width, params.height, ratio, region.size());
        Self {
            ratio,
            region,
            output,
        }
    }
}

/// Horizontal center, upper third: where a portrait subject usually sits.
pub fn default_focus(image: Size) -> Point {
    Point::new(image.width as f64 / 2.0, image.height as f64 / 3.0)
}

fn usable_ratio(ratio: f64) -> Option<f64> {
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

/// Explicit output dimensions win; otherwise the bound keeps its own shape.
pub fn resolve_ratio(width: Option<u32>, height: Option<u32>, bound: &Rectangle) -> f64 {
    let explicit = match (width, height) {
        (Some(width), Some(height)) => usable_ratio(width as f64 / height as f64),
        _ => None,
    };
    explicit
        .or_else(|| usable_ratio(bound.width / bound.height))
        .unwrap_or(1.0)
}

/// Largest `ratio`-shaped rectangle inside `bound`, centered as close to
/// `focus` as the bound allows.
pub fn resolve(ratio: f64, focus: Point, bound: &Rectangle) -> Rectangle {
    if !(bound.width > 0.0 && bound.height > 0.0) {
        return *bound;
    }
    let ratio = usable_ratio(ratio).unwrap_or(bound.width / bound.height);

    let (width, height) = if bound.width / bound.height > ratio {
        ((bound.height * ratio).min(bound.width), bound.height)
    } else {
        (bound.width, (bound.width / ratio).min(bound.height))
    };

    let x = clamp_axis(focus.x - width / 2.0, bound.x, bound.right() - width);
    let y = clamp_axis(focus.y - height / 2.0, bound.y, bound.bottom() - height);

    Rectangle::new(x, y, width, height)
}

// `f64::clamp` panics on min > max or NaN bounds; rounding can produce either.
fn clamp_axis(value: f64, min: f64, max: f64) -> f64 {
    let value = if value.is_nan() { min } else { value };
    value.min(max).max(min)
}

/// Snap to whole pixels and keep the region inside the image, at least 1x1.
pub fn clamp_to_image(rect: &Rectangle, image: Size) -> Region {
    let image_width = image.width.max(1);
    let image_height = image.height.max(1);

    // `as u32` saturates and maps NaN to 0.
    let x = (rect.x.round().max(0.0) as u32).min(image_width - 1);
    let y = (rect.y.round().max(0.0) as u32).min(image_height - 1);
    let width = (rect.width.round() as u32).clamp(1, image_width - x);
    let height = (rect.height.round() as u32).clamp(1, image_height - y);

    Region {
        x,
        y,
        width,
        height,
    }
}

/// Final output dimensions: fill a missing side from `ratio`, then shrink
/// (never enlarge) to fit the source region.
pub fn limited_size(width: Option<u32>, height: Option<u32>, ratio: f64, region: Size) -> Size {
    let ratio = usable_ratio(ratio).unwrap_or(1.0);
    let region_width = region.width.max(1) as f64;
    let region_height = region.height.max(1) as f64;

    let (width, height) = match (width, height) {
        (Some(width), Some(height)) => (width as f64, height as f64),
        (Some(width), None) => (width as f64, width as f64 / ratio),
        (None, Some(height)) => (height as f64 * ratio, height as f64),
        (None, None) => (region_width, region_height),
    };

    let scale = (region_width / width)
        .min(region_height / height)
        .min(1.0);
    let scale = if scale.is_nan() { 1.0 } else { scale };

    let side = |value: f64, limit: f64| (value * scale).round().clamp(1.0, limit) as u32;
    Size::new(side(width, region_width), side(height, region_height))
}
