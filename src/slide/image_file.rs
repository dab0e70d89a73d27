//! Image files opened as pyramids.
//!
//! Plain PNG/JPEG images have a single resolution. To read them through the
//! same machinery as a whole-slide image, the decoded image is normalised to
//! gray or RGB at 8 or 16 bits and reduced by 2x repeatedly to build a
//! power-of-two pyramid, held by a [`MemoryDecoder`].

use std::path::Path;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageError, ImageReader};
use tracing::{debug, info};

use crate::error::DecodeError;
use crate::region::PixelType;

use super::memory::{MemoryDecoder, MemoryLevel, MemorySeries};

fn image_error(err: ImageError) -> DecodeError {
    match err {
        ImageError::IoError(e) => DecodeError::from(e),
        other => DecodeError::Unsupported {
            reason: other.to_string(),
        },
    }
}

/// Reduce any decoded image to one of the four layouts the pyramid supports.
fn normalise(image: DynamicImage) -> (DynamicImage, PixelType, u32) {
    match image.color() {
        ColorType::L8 | ColorType::La8 => {
            (DynamicImage::ImageLuma8(image.to_luma8()), PixelType::U8, 1)
        }
        ColorType::L16 | ColorType::La16 => {
            (DynamicImage::ImageLuma16(image.to_luma16()), PixelType::U16, 1)
        }
        ColorType::Rgb16 | ColorType::Rgba16 => {
            (DynamicImage::ImageRgb16(image.to_rgb16()), PixelType::U16, 3)
        }
        _ => (DynamicImage::ImageRgb8(image.to_rgb8()), PixelType::U8, 3),
    }
}

/// Open an image file and build up to `levels` power-of-two resolution levels.
///
/// Level `n` is the base image reduced by `2^n`. Building stops early when a
/// dimension would reach zero.
///
/// # Errors
///
/// Returns [`DecodeError::Io`] if the file cannot be read, or
/// [`DecodeError::Unsupported`] if it is not a decodable PNG or JPEG.
pub fn open_pyramid(path: &Path, levels: usize) -> Result<MemoryDecoder, DecodeError> {
    let decoded = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(image_error)?;

    let (base, pixel_type, channels) = normalise(decoded);
    info!(
        path = %path.display(),
        width = base.width(),
        height = base.height(),
        channels,
        pixel_type = ?pixel_type,
        "Decoded image"
    );

    let mut series = MemorySeries::new(pixel_type, channels).with_rgb(channels, true);
    if cfg!(target_endian = "big") {
        series = series.with_big_endian();
    }

    let mut current = base;
    for level in 0..levels.max(1) {
        let (width, height) = (current.width(), current.height());
        let next = (level + 1 < levels && width >= 2 && height >= 2)
            .then(|| current.resize_exact(width / 2, height / 2, FilterType::Triangle));

        debug!(level, width, height, "Built pyramid level");
        series = series.with_level(MemoryLevel::new(width, height, vec![current.into_bytes()]));

        match next {
            Some(image) => current = image,
            None => break,
        }
    }

    Ok(MemoryDecoder::new(vec![series])?.with_source(path))
}

// =============================================================================
// Tests
// =============================================================================
