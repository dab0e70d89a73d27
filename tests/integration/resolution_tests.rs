//! Resolution level integration tests.
//!
//! Tests verify:
//! - Non power-of-two levels are excluded from the table
//! - Requests between native levels read the closer level and downscale
//! - Level 0 coordinates are mapped onto the reader level
//! - The table follows the requested series

use wsi_region_reader::{MemoryDecoder, ReadRequest, Rect, RegionReader};

use super::test_utils::{box_downscale, crop, gray_series, pattern, settings};

#[test]
fn test_spurious_level_is_skipped() {
    let series = gray_series(&[(100, 100), (50, 50), (33, 33)]);
    let reader =
        RegionReader::with_settings(MemoryDecoder::new(vec![series]).unwrap(), settings(2)).unwrap();

    let table = reader.resolution_table(0).unwrap();
    let shifts: Vec<u32> = table.levels().iter().map(|l| l.shift).collect();
    assert_eq!(shifts, vec![0, 1]);

    let one = table.resolve(1);
    assert_eq!((one.reader_index, one.residual), (1, 0));
    let two = table.resolve(2);
    assert_eq!((two.reader_index, two.residual), (1, 1));
}

#[test]
fn test_read_between_native_levels() {
    let series = gray_series(&[(100, 100), (50, 50), (33, 33)]);
    let reader =
        RegionReader::with_settings(MemoryDecoder::new(vec![series]).unwrap(), settings(2)).unwrap();

    let request = ReadRequest::new(Rect::new(0, 0, 100, 100))
        .at_resolution(2)
        .with_tile_size(16, 16);
    let image = reader
        .read_region::<u8, _>(&request, |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();

    let report = image.report();
    assert_eq!(report.reader_level, 1);
    assert_eq!(report.reader_shift, 1);
    assert_eq!(report.residual_downscale, 1);
    assert_eq!((image.width(), image.height()), (25, 25));

    // level 1 holds pattern seed 1
    let (expected, _, _) = box_downscale(&pattern(50, 50, 1), 50, 50);
    assert_eq!(image.channel(0).unwrap(), expected.as_slice());
}

#[test]
fn test_level_zero_coordinates_are_shifted() {
    let series = gray_series(&[(128, 96), (64, 48), (32, 24)]);
    let reader =
        RegionReader::with_settings(MemoryDecoder::new(vec![series]).unwrap(), settings(2)).unwrap();

    // (20, 12, 40, 30) at level 0 covers (5, 3)..(15, 11) at level 2, far edge rounded up
    let request = ReadRequest::new(Rect::new(20, 12, 40, 30))
        .at_resolution(2)
        .with_tile_size(4, 4);
    let image = reader
        .read_region::<u8, _>(&request, |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();

    let expected_rect = Rect::new(5, 3, 10, 8);
    assert_eq!(image.report().reader_level, 2);
    assert_eq!(image.report().reader_region, expected_rect);
    assert_eq!(
        image.channel(0).unwrap(),
        crop(&pattern(32, 24, 2), 32, expected_rect).as_slice()
    );
}

#[test]
fn test_sparse_pyramid() {
    // shifts 0, 2 and 4 only
    let series = gray_series(&[(256, 256), (64, 64), (16, 16)]);
    let reader =
        RegionReader::with_settings(MemoryDecoder::new(vec![series]).unwrap(), settings(2)).unwrap();
    let table = reader.resolution_table(0).unwrap();

    let mapping: Vec<(usize, u32)> = (0..=6)
        .map(|r| {
            let resolved = table.resolve(r);
            (resolved.reader_index, resolved.residual)
        })
        .collect();
    assert_eq!(
        mapping,
        vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1), (2, 2)]
    );
}

#[test]
fn test_table_follows_series() {
    let first = gray_series(&[(64, 64), (32, 32)]);
    let second = gray_series(&[(80, 80), (40, 40), (20, 20)]);
    let reader = RegionReader::with_settings(
        MemoryDecoder::new(vec![first, second]).unwrap(),
        settings(2),
    )
    .unwrap();

    assert_eq!(reader.resolution_table(0).unwrap().levels().len(), 2);
    assert_eq!(reader.resolution_table(1).unwrap().levels().len(), 3);

    let request = ReadRequest::new(Rect::new(0, 0, 80, 80))
        .with_series(1)
        .at_resolution(2);
    let image = reader
        .read_region::<u8, _>(&request, |_, _| true)
        .unwrap()
        .into_image()
        .unwrap();
    assert_eq!((image.width(), image.height()), (20, 20));
    assert_eq!(image.channel(0).unwrap(), pattern(20, 20, 2).as_slice());

    // back to the first series
    assert_eq!(reader.resolution_table(0).unwrap().series(), 0);
}
