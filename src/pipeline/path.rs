//! Request path grammar for derived images.
//!
//! A path is `<id>/<version>/<segment>/<segment>/...` where `<id>` looks like
//! `2001/12-31/image.jpg`. Each trailing segment is parsed on its own and
//! folded left to right into a [`TransformSpec`]; later segments overwrite
//! earlier ones, including the error message of an invalid segment.

use regex::Regex;
use std::sync::LazyLock;

use super::types::{Color, OutputFormat, Point, Rectangle, TransformSpec};

static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^/?(?P<id>\d{4}/(?:0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01])/[A-Za-z0-9_-]+\.(?i:jpg|jpeg|gif|png))(?:/(?P<version>[^/]*)(?P<rest>/.*)?)?$",
    )
    .expect("prefix pattern is valid")
});
static WIDTH_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)$").expect("width pattern is valid"));
static DIMENSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)?x(\d+)?$").expect("dimensions pattern is valid"));
static FOCUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^fp=(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)$").expect("focus pattern is valid")
});
static CROP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^crop=(\d+),(\d+),(\d+),(\d+)$").expect("crop pattern is valid")
});
static QUALITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^q=(\d+)$").expect("quality pattern is valid"));
static BACKGROUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bg=([0-9a-f]{6})$").expect("background pattern is valid"));

/// One transform segment of a request path.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSegment {
    Empty,
    Format(OutputFormat),
    Dimensions {
        width: Option<u32>,
        height: Option<u32>,
    },
    Focus(Point),
    Crop(Rectangle),
    Quality(u8),
    Background(Color),
    Invalid(String),
}

impl ParsedSegment {
    /// Grammar alternatives are tried in a fixed order; the first match wins.
    pub fn parse(segment: &str) -> Self {
        if segment.is_empty() {
            return ParsedSegment::Empty;
        }

        if let Ok(format) = segment.parse::<OutputFormat>() {
            return ParsedSegment::Format(format);
        }

        if let Some(caps) = WIDTH_ONLY.captures(segment) {
            return match caps[1].parse::<u32>() {
                Ok(width) => ParsedSegment::Dimensions {
                    width: Some(width),
                    height: None,
                },
                Err(_) => ParsedSegment::invalid(segment),
            };
        }

        if let Some(caps) = DIMENSIONS.captures(segment) {
            let side = |index: usize| caps.get(index).map(|m| m.as_str().parse::<u32>());
            return match (side(1).transpose(), side(2).transpose()) {
                (Ok(width), Ok(height)) => ParsedSegment::Dimensions { width, height },
                _ => ParsedSegment::invalid(segment),
            };
        }

        if let Some(caps) = FOCUS.captures(segment) {
            return match (caps[1].parse::<f64>(), caps[2].parse::<f64>()) {
                (Ok(x), Ok(y)) => ParsedSegment::Focus(Point::new(x, y)),
                _ => ParsedSegment::invalid(segment),
            };
        }

        if let Some(caps) = CROP.captures(segment) {
            let values: Result<Vec<u32>, _> = (1..=4).map(|i| caps[i].parse::<u32>()).collect();
            return match values.as_deref() {
                Ok([x, y, width, height]) => ParsedSegment::Crop(Rectangle::new(
                    *x as f64,
                    *y as f64,
                    *width as f64,
                    *height as f64,
                )),
                _ => ParsedSegment::invalid(segment),
            };
        }

        if let Some(caps) = QUALITY.captures(segment) {
            return match caps[1].parse::<u8>() {
                Ok(quality) if (1..=100).contains(&quality) => ParsedSegment::Quality(quality),
                _ => ParsedSegment::invalid(segment),
            };
        }

        if let Some(caps) = BACKGROUND.captures(segment) {
            return match Color::from_hex(&caps[1]) {
                Some(color) => ParsedSegment::Background(color),
                None => ParsedSegment::invalid(segment),
            };
        }

        ParsedSegment::invalid(segment)
    }

    fn invalid(segment: &str) -> Self {
        ParsedSegment::Invalid(format!("invalid segment {}", segment))
    }

    /// Merge this segment into the accumulated spec.
    pub fn apply(self, spec: &mut TransformSpec) {
        match self {
            ParsedSegment::Empty => {}
            ParsedSegment::Format(format) => spec.format = Some(format),
            ParsedSegment::Dimensions { width, height } => {
                spec.width = width;
                spec.height = height;
            }
            ParsedSegment::Focus(point) => spec.focus = Some(point),
            ParsedSegment::Crop(rect) => spec.crop = Some(rect),
            ParsedSegment::Quality(quality) => spec.quality = Some(quality),
            ParsedSegment::Background(color) => spec.background = Some(color),
            ParsedSegment::Invalid(message) => spec.error = Some(message),
        }
    }
}

/// Parse a full request path (routing prefix already removed).
pub fn parse(path: &str) -> TransformSpec {
    let Some(caps) = PREFIX.captures(path) else {
        return TransformSpec::malformed(format!("invalid path {}", path));
    };

    let mut spec = TransformSpec {
        id: Some(caps["id"].to_string()),
        version_id: caps
            .name("version")
            .map(|m| m.as_str())
            .filter(|version| !version.is_empty())
            .map(str::to_string),
        ..TransformSpec::default()
    };

    if let Some(rest) = caps.name("rest") {
        apply_segments(rest.as_str(), &mut spec);
    }

    spec
}

/// Parse bare transform segments such as `webp/300x400/fp=10,20`, without an id.
pub fn parse_transform(segments: &str) -> TransformSpec {
    let mut spec = TransformSpec::default();
    apply_segments(segments, &mut spec);
    spec
}

fn apply_segments(segments: &str, spec: &mut TransformSpec) {
    segments
        .split('/')
        .map(ParsedSegment::parse)
        .for_each(|segment| segment.apply(spec));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_stable_across_trailing_segments() {
        for path in [
            "/2001/12-31/image.jpg",
            "/2001/12-31/image.jpg/",
            "/2001/12-31/image.jpg/400x300",
            "/2001/12-31/image.jpg/v1//",
            "2001/12-31/image.jpg/v1/webp/",
        ] {
            let spec = parse(path);
            assert_eq!(spec.id.as_deref(), Some("2001/12-31/image.jpg"), "{}", path);
            assert!(spec.error.is_none(), "{}: {:?}", path, spec.error);
        }
    }

    #[test]
    fn test_version_follows_id() {
        let spec = parse("/2001/12-31/image.jpg/V1/webp");
        assert_eq!(spec.version_id.as_deref(), Some("V1"));
        assert_eq!(spec.format, Some(OutputFormat::WebP));

        let spec = parse("/2001/12-31/image.jpg");
        assert_eq!(spec.version_id, None);
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(
            parse("/1999/01-01/IMG_0001.JPEG/v").id.as_deref(),
            Some("1999/01-01/IMG_0001.JPEG")
        );
        assert!(parse("/1999/01-01/photo.PnG").id.is_some());
    }

    #[test]
    fn test_prefix_mismatch_yields_error_only() {
        for path in [
            "/favicon.ico",
            "/2001/13-01/image.jpg",
            "/2001/12-32/image.jpg",
            "/2001/12-31/image.bmp",
            "/01/12-31/image.jpg",
            "/2001/12-31/ima.ge.jpg",
        ] {
            let spec = parse(path);
            assert!(spec.error.is_some(), "{}", path);
            assert_eq!(spec.id, None, "{}", path);
            assert_eq!(spec.version_id, None, "{}", path);
        }
    }

    #[test]
    fn test_dimension_segments() {
        assert_eq!(
            ParsedSegment::parse("100"),
            ParsedSegment::Dimensions {
                width: Some(100),
                height: None
            }
        );
        assert_eq!(
            ParsedSegment::parse("200x"),
            ParsedSegment::Dimensions {
                width: Some(200),
                height: None
            }
        );
        assert_eq!(
            ParsedSegment::parse("x300"),
            ParsedSegment::Dimensions {
                width: None,
                height: Some(300)
            }
        );
        assert_eq!(
            ParsedSegment::parse("400x300"),
            ParsedSegment::Dimensions {
                width: Some(400),
                height: Some(300)
            }
        );
        assert_eq!(
            ParsedSegment::parse("x"),
            ParsedSegment::Dimensions {
                width: None,
                height: None
            }
        );
        assert!(matches!(
            ParsedSegment::parse("99999999999x1"),
            ParsedSegment::Invalid(_)
        ));
    }

    #[test]
    fn test_later_dimensions_overwrite_both_sides() {
        let spec = parse("/2001/12-31/image.jpg/v1/400x300/200x");
        assert_eq!(spec.width, Some(200));
        assert_eq!(spec.height, None);
    }

    #[test]
    fn test_focus_and_crop() {
        let spec = parse("/2001/12-31/image.jpg/v1/fp=200,100/crop=10,20,30,40");
        assert_eq!(spec.focus, Some(Point::new(200.0, 100.0)));
        assert_eq!(spec.crop, Some(Rectangle::new(10.0, 20.0, 30.0, 40.0)));

        assert_eq!(
            ParsedSegment::parse("fp=1.5,2.25"),
            ParsedSegment::Focus(Point::new(1.5, 2.25))
        );
        assert!(matches!(
            ParsedSegment::parse("crop=1,2,3"),
            ParsedSegment::Invalid(_)
        ));
    }

    #[test]
    fn test_quality_and_background() {
        let spec = parse("/2001/12-31/image.jpg/v1/q=55/bg=00ff7f");
        assert_eq!(spec.quality, Some(55));
        assert_eq!(spec.background.map(|c| c.to_string()).as_deref(), Some("#00ff7f"));

        assert!(matches!(ParsedSegment::parse("q=0"), ParsedSegment::Invalid(_)));
        assert!(matches!(ParsedSegment::parse("q=101"), ParsedSegment::Invalid(_)));
        assert!(matches!(
            ParsedSegment::parse("bg=FFFFFF"),
            ParsedSegment::Invalid(_)
        ));
    }

    #[test]
    fn test_invalid_segment_keeps_other_segments() {
        let spec = parse("/2001/12-31/image.jpg/v1/webp/bla=123/fp=10,20");
        assert_eq!(spec.error.as_deref(), Some("invalid segment bla=123"));
        assert_eq!(spec.format, Some(OutputFormat::WebP));
        assert_eq!(spec.focus, Some(Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_last_invalid_segment_wins() {
        let spec = parse("/2001/12-31/image.jpg/v1/first/300/second");
        assert_eq!(spec.error.as_deref(), Some("invalid segment second"));
        assert_eq!(spec.width, Some(300));
    }

    #[test]
    fn test_format_names_take_precedence() {
        for (segment, format) in [
            ("webp", OutputFormat::WebP),
            ("jpeg", OutputFormat::Jpeg),
            ("avif", OutputFormat::Avif),
            ("gif", OutputFormat::Gif),
        ] {
            assert_eq!(ParsedSegment::parse(segment), ParsedSegment::Format(format));
        }
        assert!(matches!(ParsedSegment::parse("png"), ParsedSegment::Invalid(_)));
    }

    #[test]
    fn test_parse_transform_without_id() {
        let spec = parse_transform("avif/640x/q=40");
        assert_eq!(spec.id, None);
        assert_eq!(spec.format, Some(OutputFormat::Avif));
        assert_eq!(spec.width, Some(640));
        assert_eq!(spec.quality, Some(40));
        assert!(spec.error.is_none());
    }
}
