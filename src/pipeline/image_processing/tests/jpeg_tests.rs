use crate::copyright::{CopyrightConfig, read_copyright};
use crate::pipeline::image_processing::extract_icc_profile;
use crate::pipeline::image_processing::formats::jpeg;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};

fn test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 7) as u8, (y * 5) as u8, 64])
    }))
}

// Not a real profile; the encoder only copies the bytes
fn create_test_icc_profile() -> Vec<u8> {
    let mut profile = vec![0u8; 300];
    profile[0..4].copy_from_slice(&300u32.to_be_bytes());
    profile[12..16].copy_from_slice(b"mntr");
    profile[16..20].copy_from_slice(b"RGB ");
    profile[36..40].copy_from_slice(b"acsp");
    profile
}

#[test]
fn test_jpeg_encode_basic() {
    let data = jpeg::encode(&test_image(64, 48), 80, None, None).unwrap();
    assert_eq!(&data[0..2], &[0xFF, 0xD8]);

    let decoded = image::load_from_memory_with_format(&data, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    assert!(jpeg::find_exif_segment(&data).is_none());
}

#[test]
fn test_jpeg_keeps_icc_profile() {
    let profile = create_test_icc_profile();
    let data = jpeg::encode(&test_image(32, 32), 85, Some(&profile), None).unwrap();

    let extracted = extract_icc_profile(&data, Some(ImageFormat::Jpeg));
    assert_eq!(extracted, Some(profile));
}

#[test]
fn test_jpeg_copyright_exif() {
    let copyright = CopyrightConfig::new("Test Photographer");
    let exif = copyright.exif_block();
    let data = jpeg::encode(&test_image(32, 32), 85, None, Some(&exif)).unwrap();

    let tiff = jpeg::find_exif_segment(&data).expect("EXIF segment present");
    assert_eq!(read_copyright(tiff), Some(copyright.notice()));

    // Still a decodable JPEG
    let decoded = image::load_from_memory(&data).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 32));
}

#[test]
fn test_jpeg_exif_follows_jfif_header() {
    let plain = jpeg::encode(&test_image(8, 8), 80, None, None).unwrap();
    let had_app0 = plain[2] == 0xFF && plain[3] == 0xE0;

    let with_exif = jpeg::insert_exif_segment(plain.clone(), b"II*\0\x08\0\0\0\0\0\0\0\0\0").unwrap();
    assert_eq!(with_exif.len(), plain.len() + 4 + 6 + 14);

    if had_app0 {
        assert_eq!(&with_exif[2..4], &[0xFF, 0xE0]);
    } else {
        assert_eq!(&with_exif[2..4], &[0xFF, 0xE1]);
    }
    assert!(jpeg::find_exif_segment(&with_exif).is_some());
}

#[test]
fn test_jpeg_exif_rejects_non_jpeg() {
    assert!(jpeg::insert_exif_segment(b"GIF89a".to_vec(), b"II*\0").is_err());
}

#[test]
fn test_jpeg_drops_alpha() {
    let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(16, 16, Rgba([10, 20, 30, 0])));
    let data = jpeg::encode(&rgba, 90, None, None).unwrap();
    let decoded = image::load_from_memory(&data).unwrap();
    assert!(!decoded.color().has_alpha());
}
