//! Image file integration tests.
//!
//! Tests verify:
//! - PNG/JPEG inputs open as power-of-two pyramids
//! - Regions written as PNG decode back to the same samples
//! - 16-bit regions keep their depth in PNG
//! - JPEG output is written at the requested quality

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use wsi_region_reader::{
    open_pyramid, OutputFormat, ReadRequest, Rect, RegionEncoder, RegionReader,
};

use super::test_utils::settings;

fn rgb_source() -> RgbImage {
    RgbImage::from_fn(96, 64, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]))
}

#[test]
fn test_png_region_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("slide.png");
    let output = dir.path().join("region.png");
    rgb_source().save(&input).unwrap();

    let decoder = open_pyramid(&input, 3).unwrap();
    let reader = RegionReader::with_settings(decoder, settings(2)).unwrap();
    let request = ReadRequest::new(Rect::new(10, 20, 50, 30))
        .with_all_channels()
        .with_tile_size(16, 16);
    let image = reader
        .read_region::<u8, _>(&request, |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();

    let format = RegionEncoder::new().write(&image, &output).unwrap();
    assert_eq!(format, OutputFormat::Png);

    let written = image::open(&output).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), (50, 30));
    for (x, y, pixel) in written.enumerate_pixels() {
        assert_eq!(pixel.0, rgb_source().get_pixel(x + 10, y + 20).0);
    }
}

#[test]
fn test_sixteen_bit_png_keeps_depth() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("deep.png");
    let output = dir.path().join("deep_region.png");
    let source: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(32, 32, |x, y| Luma([(x * 1000 + y) as u16]));
    source.save(&input).unwrap();

    let reader = RegionReader::with_settings(open_pyramid(&input, 1).unwrap(), settings(2)).unwrap();
    let image = reader
        .read_region::<u16, _>(&ReadRequest::new(Rect::new(0, 0, 32, 32)), |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();
    assert_eq!(image.sample(31, 2, 0), Some(31002));

    RegionEncoder::new().write(&image, &output).unwrap();
    let written = image::open(&output).unwrap().to_luma16();
    assert_eq!(written.get_pixel(31, 2).0, [31002]);
}

#[test]
fn test_downscaled_jpeg_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("slide.png");
    let output = dir.path().join("thumb.JPG");
    rgb_source().save(&input).unwrap();

    let reader = RegionReader::with_settings(open_pyramid(&input, 2).unwrap(), settings(2)).unwrap();
    let request = ReadRequest::new(Rect::new(0, 0, 96, 64))
        .with_all_channels()
        .at_resolution(3);
    let image = reader
        .read_region::<u8, _>(&request, |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();

    // level 1 (48x32) plus two passes
    assert_eq!(image.report().reader_level, 1);
    assert_eq!(image.report().residual_downscale, 2);
    assert_eq!((image.width(), image.height()), (12, 8));

    let format = RegionEncoder::new()
        .with_quality(75)
        .write(&image, &output)
        .unwrap();
    assert_eq!(format, OutputFormat::Jpeg);
    assert_eq!(image::open(&output).unwrap().to_rgb8().dimensions(), (12, 8));
}

#[test]
fn test_unknown_output_extension() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("slide.png");
    rgb_source().save(&input).unwrap();

    let reader = RegionReader::new(open_pyramid(&input, 1).unwrap());
    let image = reader
        .read_region::<u8, _>(&ReadRequest::new(Rect::new(0, 0, 8, 8)), |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();

    let result = RegionEncoder::new().write(&image, &dir.path().join("region.bmp"));
    assert!(matches!(
        result,
        Err(wsi_region_reader::RegionError::Encode { .. })
    ));
}
