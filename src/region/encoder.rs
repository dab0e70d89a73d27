//! Region image encoder.
//!
//! Turns an assembled [`RegionImage`] into PNG or JPEG bytes.
//!
//! # Design Decisions
//!
//! - **Planes to pixels**: channel planes are interleaved into an
//!   [`image::DynamicImage`]: 1 channel is gray, 2 gray+alpha, 3 RGB, 4 RGBA.
//!   Other channel counts cannot be encoded.
//!
//! - **JPEG is 8-bit**: 16-bit regions are reduced to 8 bits and alpha is
//!   dropped when writing JPEG. PNG keeps the full sample depth.
//!
//! - **Format by extension**: `.png`, `.jpg` and `.jpeg` are recognised,
//!   case-insensitively.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Pixel, Rgb, Rgba};

use crate::config::DEFAULT_JPEG_QUALITY;
use crate::error::RegionError;

use super::job::RegionImage;
use super::sample::Sample;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Format
// =============================================================================

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, RegionError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("png") => Ok(OutputFormat::Png),
            Some("jpg") | Some("jpeg") => Ok(OutputFormat::Jpeg),
            _ => Err(RegionError::Encode {
                message: format!(
                    "cannot infer output format from {} (expected .png, .jpg or .jpeg)",
                    path.display()
                ),
            }),
        }
    }
}

// =============================================================================
// Encodable Samples
// =============================================================================

/// Sample types that map onto an [`image`] pixel depth.
pub trait EncodableSample: Sample {
    fn to_dynamic_image(image: &RegionImage<Self>) -> Result<DynamicImage, RegionError>;
}

fn buffer<P: Pixel>(
    width: u32,
    height: u32,
    data: Vec<P::Subpixel>,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, RegionError> {
    ImageBuffer::from_raw(width, height, data).ok_or_else(|| RegionError::Encode {
        message: format!("sample buffer does not match {width}x{height}"),
    })
}

fn unsupported_channels(count: usize) -> RegionError {
    RegionError::Encode {
        message: format!("cannot encode {count} channels (expected 1 to 4)"),
    }
}

impl EncodableSample for u8 {
    fn to_dynamic_image(image: &RegionImage<u8>) -> Result<DynamicImage, RegionError> {
        let (w, h) = (image.width(), image.height());
        let data = image.to_interleaved();
        Ok(match image.channel_count() {
            1 => DynamicImage::ImageLuma8(buffer::<Luma<u8>>(w, h, data)?),
            2 => DynamicImage::ImageLumaA8(buffer::<LumaA<u8>>(w, h, data)?),
            3 => DynamicImage::ImageRgb8(buffer::<Rgb<u8>>(w, h, data)?),
            4 => DynamicImage::ImageRgba8(buffer::<Rgba<u8>>(w, h, data)?),
            count => return Err(unsupported_channels(count)),
        })
    }
}

impl EncodableSample for u16 {
    fn to_dynamic_image(image: &RegionImage<u16>) -> Result<DynamicImage, RegionError> {
        let (w, h) = (image.width(), image.height());
        let data = image.to_interleaved();
        Ok(match image.channel_count() {
            1 => DynamicImage::ImageLuma16(buffer::<Luma<u16>>(w, h, data)?),
            2 => DynamicImage::ImageLumaA16(buffer::<LumaA<u16>>(w, h, data)?),
            3 => DynamicImage::ImageRgb16(buffer::<Rgb<u16>>(w, h, data)?),
            4 => DynamicImage::ImageRgba16(buffer::<Rgba<u16>>(w, h, data)?),
            count => return Err(unsupported_channels(count)),
        })
    }
}

// =============================================================================
// Region Encoder
// =============================================================================

/// Encoder for assembled regions.
///
/// # Example
///
/// ```ignore
/// use wsi_region_reader::region::{OutputFormat, RegionEncoder};
///
/// let encoder = RegionEncoder::new().with_quality(85);
/// let jpeg = encoder.encode(&image, OutputFormat::Jpeg)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionEncoder {
    quality: u8,
}

impl Default for RegionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionEncoder {
    /// Create an encoder with the default JPEG quality.
    pub fn new() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality, clamped to 1-100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode `image` into `format`.
    pub fn encode<T: EncodableSample>(
        &self,
        image: &RegionImage<T>,
        format: OutputFormat,
    ) -> Result<Vec<u8>, RegionError> {
        let dynamic = T::to_dynamic_image(image)?;
        let mut output = Vec::new();

        match format {
            OutputFormat::Png => dynamic
                .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| RegionError::Encode {
                    message: e.to_string(),
                })?,
            OutputFormat::Jpeg => {
                let eight_bit = if image.channel_count() <= 2 {
                    DynamicImage::ImageLuma8(dynamic.to_luma8())
                } else {
                    DynamicImage::ImageRgb8(dynamic.to_rgb8())
                };
                JpegEncoder::new_with_quality(&mut output, self.quality)
                    .encode_image(&eight_bit)
                    .map_err(|e| RegionError::Encode {
                        message: e.to_string(),
                    })?
            }
        }

        Ok(output)
    }

    /// Encode `image` and write it to `path`, choosing the format from the
    /// extension.
    pub fn write<T: EncodableSample>(
        &self,
        image: &RegionImage<T>,
        path: &Path,
    ) -> Result<OutputFormat, RegionError> {
        let format = OutputFormat::from_path(path)?;
        let bytes = self.encode(image, format)?;
        std::fs::write(path, bytes).map_err(|e| RegionError::Encode {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
        Ok(format)
    }
}

// =============================================================================
// Tests
// =============================================================================
