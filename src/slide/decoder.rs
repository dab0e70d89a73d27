//! Decoder capability trait.
//!
//! This module defines the `Decoder` trait, the narrow interface the region
//! reader consumes from whatever actually understands an image file. A decoder
//! is stateful: it is bound to one (series, resolution) pair at a time and all
//! size queries and reads refer to that binding.
//!
//! Decoders are required to be `Send` so a handle can move to a worker thread,
//! but not `Sync`. A handle is never shared between threads; each worker owns a
//! clone obtained through the [`ReaderPool`](crate::pool::ReaderPool).

use crate::error::DecodeError;
use crate::region::PixelType;
use crate::tile::Rect;

/// Format-agnostic access to a multi-series, multi-resolution image.
///
/// # Example
///
/// ```ignore
/// use wsi_region_reader::slide::Decoder;
///
/// fn read_corner<D: Decoder>(decoder: &mut D) -> Result<Vec<u8>, DecodeError> {
///     decoder.bind(0, 0)?;
///     let plane = decoder.plane_index(0, 0, 0)?;
///     let mut bytes = Vec::new();
///     decoder.read_region_bytes(plane, Rect::new(0, 0, 64, 64), &mut bytes)?;
///     Ok(bytes)
/// }
/// ```
pub trait Decoder: Send + 'static {
    /// Number of image series in the opened file.
    fn series_count(&self) -> usize;

    /// Bind the handle to a series and resolution level.
    ///
    /// Binding is idempotent and cheap: it resets handle state, it does not
    /// reopen the file.
    fn bind(&mut self, series: usize, resolution: usize) -> Result<(), DecodeError>;

    /// Currently bound series.
    fn series(&self) -> usize;

    /// Currently bound resolution level.
    fn resolution(&self) -> usize;

    /// Number of resolution levels in the bound series. Level 0 is full size.
    fn resolution_count(&self) -> usize;

    /// Width of the bound resolution level.
    fn size_x(&self) -> u32;

    /// Height of the bound resolution level.
    fn size_y(&self) -> u32;

    fn size_z(&self) -> u32;

    /// Total channel count, counting each sample of an RGB plane.
    fn size_c(&self) -> u32;

    fn size_t(&self) -> u32;

    /// Samples stored per plane. 1 for planar data, 3 for RGB planes.
    fn rgb_channel_count(&self) -> u32 {
        1
    }

    /// Whether the samples of an RGB plane are interleaved per pixel.
    fn is_interleaved(&self) -> bool {
        false
    }

    fn is_little_endian(&self) -> bool {
        true
    }

    fn pixel_type(&self) -> PixelType;

    /// Plane index for a (z, effective channel, t) position.
    ///
    /// The effective channel counts planes, not samples: for an RGB plane
    /// the three samples share one effective channel. Planes are ordered
    /// Z fastest, then C, then T.
    fn plane_index(&self, z: u32, c: u32, t: u32) -> Result<usize, DecodeError> {
        let rgb = self.rgb_channel_count().max(1);
        let effective_c = (self.size_c() / rgb).max(1);
        if z >= self.size_z() || c >= effective_c || t >= self.size_t() {
            return Err(DecodeError::InvalidPosition { z, c, t });
        }
        let size_z = self.size_z() as usize;
        Ok(z as usize + size_z * (c as usize + effective_c as usize * t as usize))
    }

    /// Read raw bytes for `rect` of `plane` at the bound resolution.
    ///
    /// `out` is cleared and refilled. Its layout is row-major; RGB planes are
    /// either interleaved per pixel or stored as consecutive sub-planes,
    /// according to [`is_interleaved`](Decoder::is_interleaved).
    fn read_region_bytes(
        &mut self,
        plane: usize,
        rect: Rect,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError>;

    /// Preferred tile width for reads at the bound resolution, if any.
    fn optimal_tile_width(&self) -> Option<u32> {
        None
    }

    /// Preferred tile height for reads at the bound resolution, if any.
    fn optimal_tile_height(&self) -> Option<u32> {
        None
    }

    /// Produce an independent handle bound to the same opened source and
    /// carrying the same binding.
    fn try_clone(&self) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
